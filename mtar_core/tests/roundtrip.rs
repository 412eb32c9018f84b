use mtar_core::{
    BLOCK_SIZE, Cid, ContentStore, Error, LINK_LEN, LINK_OFFSET, MemoryStore, Store, StoreConfig,
    CompressionType, decode, encode, verify,
};
use proptest::prelude::*;
use std::io;
use tempfile::TempDir;

fn file_header(path: &str, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_uid(1000);
    header.set_gid(1000);
    header.set_mtime(1_700_000_000);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    header
}

fn link_header(path: &str, target: &str, kind: tar::EntryType) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(0);
    header.set_mode(0o777);
    header.set_mtime(1_700_000_000);
    header.set_entry_type(kind);
    header.set_link_name(target).unwrap();
    header.set_cksum();
    header
}

fn dir_header(path: &str) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(1_700_000_000);
    header.set_entry_type(tar::EntryType::Directory);
    header.set_cksum();
    header
}

/// A single `"<len> key=value\n"` PAX record.
fn pax_record(key: &str, value: &str) -> Vec<u8> {
    let body = format!(" {}={}\n", key, value);
    let mut len = body.len() + 1;
    while format!("{}{}", len, body).len() != len {
        len += 1;
    }
    format!("{}{}", len, body).into_bytes()
}

fn roundtrip(tar: &[u8], store: &dyn ContentStore) -> Vec<u8> {
    let mut mtar = Vec::new();
    encode(tar, &mut mtar, store).unwrap();
    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, store).unwrap();
    restored
}

fn block(bytes: &[u8], index: usize) -> &[u8] {
    &bytes[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE]
}

#[test]
fn test_roundtrip_mixed_archive() {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&dir_header("project/"), io::empty()).unwrap();
    builder
        .append(&file_header("project/README", 12), &b"read me now\n"[..])
        .unwrap();
    builder
        .append(
            &link_header("project/latest", "README", tar::EntryType::Symlink),
            io::empty(),
        )
        .unwrap();
    builder
        .append(
            &link_header("project/copy", "project/README", tar::EntryType::Link),
            io::empty(),
        )
        .unwrap();
    let big: Vec<u8> = (0..200_000u32).map(|i| (i * 31 % 256) as u8).collect();
    builder
        .append(&file_header("project/data.bin", big.len() as u64), &big[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    assert_eq!(roundtrip(&tar, &store), tar);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_roundtrip_keeps_record_padding() {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("a", 3), &b"abc"[..])
        .unwrap();
    let mut tar = builder.into_inner().unwrap();
    // Pad out to a 10 KiB record, as tar(1) does.
    tar.resize(10240, 0);

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let stats = encode(&tar[..], &mut mtar, &store).unwrap();
    assert_eq!(stats.trailer_bytes, 10240 - 2 * BLOCK_SIZE as u64);

    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &store).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_roundtrip_without_end_marker() {
    let mut tar = file_header("bare", 5).as_bytes().to_vec();
    tar.extend_from_slice(b"hello");
    tar.resize(2 * BLOCK_SIZE, 0);

    let store = MemoryStore::new();
    assert_eq!(roundtrip(&tar, &store), tar);
}

#[test]
fn test_identical_content_is_stored_once() {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("one.txt", 9), &b"same data"[..])
        .unwrap();
    builder
        .append(&file_header("two.txt", 9), &b"same data"[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let stats = encode(&tar[..], &mut mtar, &store).unwrap();

    let cid = Cid::of(b"same data").to_text();
    let link = LINK_OFFSET..LINK_OFFSET + cid.len();
    assert_eq!(&block(&mtar, 1)[link.clone()], cid.as_bytes());
    assert_eq!(&block(&mtar, 2)[link], cid.as_bytes());
    assert_eq!(store.len(), 1);
    assert_eq!(stats.files, 2);
    assert_eq!(stats.unique_blobs, 1);
}

#[test]
fn test_directory_and_symlink_pass_through() {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&dir_header("etc/"), io::empty()).unwrap();
    builder
        .append(
            &link_header("etc/localtime", "/usr/share/zoneinfo/UTC", tar::EntryType::Symlink),
            io::empty(),
        )
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let stats = encode(&tar[..], &mut mtar, &store).unwrap();
    assert_eq!(stats.passthrough, 2);
    assert!(store.is_empty());
    assert_eq!(&mtar[BLOCK_SIZE..], &tar[..]);

    // An empty store is enough to decode it.
    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &MemoryStore::new()).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_file_with_link_field_is_rejected() {
    let mut header = file_header("weird", 4);
    header.set_link_name("somewhere").unwrap();
    header.set_cksum();
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("fine", 2), &b"ok"[..])
        .unwrap();
    builder.append(&header, &b"data"[..]).unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let err = encode(&tar[..], &mut mtar, &store).unwrap_err();
    match err {
        Error::Precondition { entry, .. } => {
            assert_eq!(entry.index, 1);
            assert_eq!(entry.path, "weird");
            assert_eq!(entry.offset, 2 * BLOCK_SIZE as u64);
        }
        other => panic!("unexpected error {:?}", other),
    }
    // Magic block and the first header only.
    assert_eq!(mtar.len(), 2 * BLOCK_SIZE);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_missing_blob_is_a_reference_error() {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("present", 7), &b"present"[..])
        .unwrap();
    builder
        .append(&file_header("absent", 6), &b"absent"[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    encode(&tar[..], &mut mtar, &store).unwrap();
    store.remove(&Cid::of(b"absent"));

    let mut restored = Vec::new();
    let err = decode(&mtar[..], &mut restored, &store).unwrap_err();
    assert!(matches!(err, Error::Reference { .. }));
    assert!(!err.is_format());
    assert_eq!(restored, &tar[..2 * BLOCK_SIZE]);
}

#[test]
fn test_empty_file() {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&file_header("empty", 0), io::empty()).unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    encode(&tar[..], &mut mtar, &store).unwrap();

    let cid = "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku";
    assert_eq!(store.len(), 1);
    assert!(store.contains(&cid.parse().unwrap()));

    let link = &block(&mtar, 1)[LINK_OFFSET..LINK_OFFSET + LINK_LEN];
    assert_eq!(&link[..cid.len()], cid.as_bytes());
    assert!(link[cid.len()..].iter().all(|&b| b == 0));

    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &store).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_gnu_long_names_pass_through() {
    let long_path = format!("{}/file.txt", "nested".repeat(30));
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = file_header("placeholder", 0);
    builder
        .append_data(&mut header, &long_path, &b"deep content"[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let stats = encode(&tar[..], &mut mtar, &store).unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.passthrough, 1);
    assert!(store.contains(&Cid::of(b"deep content")));

    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &store).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_pax_size_override() {
    let content = vec![0xabu8; 5000];
    let mut records = pax_record("path", "from/pax/record.bin");
    records.extend(pax_record("size", &content.len().to_string()));

    let mut pax = tar::Header::new_ustar();
    pax.set_path("PaxHeaders/record.bin").unwrap();
    pax.set_size(records.len() as u64);
    pax.set_entry_type(tar::EntryType::XHeader);
    pax.set_cksum();

    // The ustar size field is left at zero; the PAX record carries the size.
    let mut file = tar::Header::new_ustar();
    file.set_path("record.bin").unwrap();
    file.set_size(0);
    file.set_mode(0o644);
    file.set_entry_type(tar::EntryType::Regular);
    file.set_cksum();

    let mut tar = Vec::new();
    tar.extend_from_slice(pax.as_bytes());
    tar.extend_from_slice(&records);
    tar.resize(tar.len().next_multiple_of(BLOCK_SIZE), 0);
    tar.extend_from_slice(file.as_bytes());
    tar.extend_from_slice(&content);
    tar.resize(tar.len().next_multiple_of(BLOCK_SIZE), 0);
    tar.extend_from_slice(&[0u8; 2 * BLOCK_SIZE]);

    let store = MemoryStore::new();
    let mut mtar = Vec::new();
    let stats = encode(&tar[..], &mut mtar, &store).unwrap();
    assert_eq!(stats.content_bytes, 5000);
    assert!(store.contains(&Cid::of(&content)));

    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &store).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_truncated_archive_is_a_format_error() {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("big", 4000), &[1u8; 4000][..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    for cut in [100, BLOCK_SIZE + 10, 3 * BLOCK_SIZE, 8 * BLOCK_SIZE + 1, 4520] {
        let err = encode(&tar[..cut], io::sink(), &MemoryStore::new()).unwrap_err();
        assert!(err.is_format(), "cut at {}: {:?}", cut, err);
    }
}

#[test]
fn test_bad_checksum_is_a_format_error() {
    let mut tar = file_header("x", 0).as_bytes().to_vec();
    tar[0] = b'y';
    tar.extend_from_slice(&[0u8; 2 * BLOCK_SIZE]);

    let err = encode(&tar[..], io::sink(), &MemoryStore::new()).unwrap_err();
    assert!(err.is_format());
}

#[test]
fn test_disk_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        compression: CompressionType::Zstd,
        ..StoreConfig::default()
    };
    let store = Store::init(temp_dir.path().join("store"), config).unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let text = b"line of text\n".repeat(5000);
    builder
        .append(&file_header("log.txt", text.len() as u64), &text[..])
        .unwrap();
    builder
        .append(&file_header("again.txt", text.len() as u64), &text[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let mut mtar = Vec::new();
    encode(&tar[..], &mut mtar, &store).unwrap();

    // Reopen to read back through a fresh handle.
    let store = Store::open(temp_dir.path().join("store")).unwrap();
    let stats = verify(&mtar[..], &store).unwrap();
    assert_eq!(stats.bytes_written, tar.len() as u64);

    let mut restored = Vec::new();
    decode(&mtar[..], &mut restored, &store).unwrap();
    assert_eq!(restored, tar);
}

#[test]
fn test_stats_serialize() {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&file_header("f", 1), &b"1"[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let stats = encode(&tar[..], io::sink(), &MemoryStore::new()).unwrap();
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["files"], 1);
    assert_eq!(json["bytes_read"], tar.len() as u64);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Any set of files survives encode then decode unchanged.
    #[test]
    fn prop_roundtrip_identity(
        files in prop::collection::vec(
            ("[a-z]{1,12}", prop::collection::vec(any::<u8>(), 0..3000)),
            0..8,
        ),
        extra_padding in 0usize..20,
    ) {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in &files {
            builder.append(&file_header(name, data.len() as u64), &data[..]).unwrap();
        }
        let mut tar = builder.into_inner().unwrap();
        tar.extend(std::iter::repeat_n(0u8, extra_padding * BLOCK_SIZE));

        let store = MemoryStore::new();
        let mut mtar = Vec::new();
        encode(&tar[..], &mut mtar, &store)?;
        let mut restored = Vec::new();
        decode(&mtar[..], &mut restored, &store)?;
        prop_assert_eq!(restored, tar);
    }
}
