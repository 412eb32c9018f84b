//! tar to mtar conversion.
//!
//! File content moves into a [`ContentStore`]; each file header keeps its
//! place in the stream with the content's CID written into the link field.
//! Every other entry, and the end-of-archive trailer, is copied untouched.

use crate::cas::ContentStore;
use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::header::LINK_LEN;
use crate::magic::magic_block;
use crate::reader::{Entry, TarReader};
use crate::writer::TarWriter;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Read, Write};
use tracing::{debug, info};

/// Summary of one encode run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodeStats {
    /// Entries read, extension records included.
    pub entries: u64,
    /// File entries moved into the store.
    pub files: u64,
    /// Entries copied through unchanged.
    pub passthrough: u64,
    /// Distinct blobs referenced by this archive.
    pub unique_blobs: u64,
    /// File content bytes handed to the store.
    pub content_bytes: u64,
    /// Bytes of tar input consumed.
    pub bytes_read: u64,
    /// Bytes of mtar output written.
    pub bytes_written: u64,
    /// Trailer bytes copied after the last entry.
    pub trailer_bytes: u64,
}

/// Convert the tar stream `input` into an mtar stream on `output`, putting
/// file content into `store`.
///
/// On error, output may hold a partial stream and the store may hold blobs
/// from entries before the failing one.
pub fn encode<R, W, S>(input: R, output: W, store: &S) -> Result<EncodeStats>
where
    R: Read,
    W: Write,
    S: ContentStore + ?Sized,
{
    let mut reader = TarReader::new(input);
    let mut writer = TarWriter::new(output);
    let mut stats = EncodeStats::default();
    let mut blobs = HashSet::new();

    writer.write_block(&magic_block())?;

    while let Some(mut entry) = reader.next_entry()? {
        stats.entries += 1;
        match entry.entry_type() {
            Ok(t) if t.is_file() => {
                let cid = encode_file(&mut entry, &mut writer, store)?;
                debug!(path = entry.path(), size = entry.size(), %cid, "stored file");
                stats.files += 1;
                stats.content_bytes += entry.size();
                blobs.insert(cid);
            }
            Ok(t) => {
                debug!(path = entry.path(), kind = t.as_str(), "passthrough");
                writer.copy_entry(&mut entry)?;
                stats.passthrough += 1;
            }
            Err(unknown) if entry.data_len() > 0 => {
                return Err(Error::encoding(
                    entry.context().clone(),
                    format!("{} with {} data bytes", unknown, entry.data_len()),
                ));
            }
            Err(unknown) => {
                debug!(path = entry.path(), flag = unknown.0, "passthrough of unknown type");
                writer.copy_entry(&mut entry)?;
                stats.passthrough += 1;
            }
        }
    }

    stats.trailer_bytes = reader.copy_trailer(&mut writer)?;
    stats.bytes_read = reader.offset();
    stats.bytes_written = writer.position();
    stats.unique_blobs = blobs.len() as u64;
    writer.into_inner()?;

    info!(
        entries = stats.entries,
        files = stats.files,
        unique_blobs = stats.unique_blobs,
        bytes_written = stats.bytes_written,
        "encoded archive"
    );
    Ok(stats)
}

/// Store one file's content and write its patched header.
fn encode_file<R, W, S>(
    entry: &mut Entry<'_, R>,
    writer: &mut TarWriter<W>,
    store: &S,
) -> Result<Cid>
where
    R: Read,
    W: Write,
    S: ContentStore + ?Sized,
{
    if !entry.header().link_is_empty() {
        return Err(Error::precondition(
            entry.context().clone(),
            "file header has a non-empty link field",
        ));
    }

    let offset = entry.context().offset;
    let cid = match store.put(&mut *entry) {
        Ok(cid) => cid,
        Err(Error::Io { source }) if source.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(Error::format(offset, source.to_string()));
        }
        Err(e) => return Err(e),
    };

    // Decoding always regenerates zero padding.
    let padding = entry.read_padding()?;
    if padding.iter().any(|&b| b != 0) {
        return Err(Error::precondition(
            entry.context().clone(),
            "file data is followed by non-zero padding",
        ));
    }

    let text = cid.to_text();
    if text.len() >= LINK_LEN {
        return Err(Error::encoding(
            entry.context().clone(),
            format!("CID of {} bytes does not fit the link field", text.len()),
        ));
    }
    let header = entry
        .header()
        .with_link(text.as_bytes())
        .map_err(|e| Error::encoding(entry.context().clone(), e.to_string()))?;
    writer.write_header(&header)?;
    Ok(cid)
}
