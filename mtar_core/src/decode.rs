//! mtar to tar conversion.

use crate::cas::ContentStore;
use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::reader::{Entry, TarReader};
use crate::writer::TarWriter;
use serde::Serialize;
use std::io::{self, Read, Write};
use tracing::{debug, info};

/// Summary of one decode run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// Entries read, extension records included.
    pub entries: u64,
    /// File entries restored from the store.
    pub files: u64,
    /// Entries copied through unchanged.
    pub passthrough: u64,
    /// File content bytes fetched from the store.
    pub content_bytes: u64,
    /// Bytes of mtar input consumed.
    pub bytes_read: u64,
    /// Bytes of tar output written.
    pub bytes_written: u64,
    /// Trailer bytes copied after the last entry.
    pub trailer_bytes: u64,
}

/// Rebuild the tar stream described by the mtar stream `input`, fetching file
/// content from `store`.
///
/// The output is byte-identical to the archive that was encoded. A missing
/// blob is a [`Error::Reference`] raised before anything of that entry is
/// written.
pub fn decode<R, W, S>(input: R, output: W, store: &S) -> Result<DecodeStats>
where
    R: Read,
    W: Write,
    S: ContentStore + ?Sized,
{
    let mut reader = TarReader::mtar(input)?;
    let mut writer = TarWriter::new(output);
    let mut stats = DecodeStats::default();

    while let Some(mut entry) = reader.next_entry()? {
        stats.entries += 1;
        match entry.entry_type() {
            Ok(t) if t.is_file() => {
                let cid = decode_file(&entry, &mut writer, store)?;
                debug!(path = entry.path(), size = entry.size(), %cid, "restored file");
                stats.files += 1;
                stats.content_bytes += entry.size();
            }
            _ => {
                debug!(path = entry.path(), "passthrough");
                writer.copy_entry(&mut entry)?;
                stats.passthrough += 1;
            }
        }
    }

    stats.trailer_bytes = reader.copy_trailer(&mut writer)?;
    stats.bytes_read = reader.offset();
    stats.bytes_written = writer.position();
    writer.into_inner()?;

    info!(
        entries = stats.entries,
        files = stats.files,
        bytes_written = stats.bytes_written,
        "decoded archive"
    );
    Ok(stats)
}

/// Check that `store` holds everything `input` needs to be rebuilt.
///
/// Runs a full decode into a sink, so every blob is fetched and every header
/// checksum verified.
pub fn verify<R, S>(input: R, store: &S) -> Result<DecodeStats>
where
    R: Read,
    S: ContentStore + ?Sized,
{
    decode(input, io::sink(), store)
}

fn decode_file<R, W, S>(entry: &Entry<'_, R>, writer: &mut TarWriter<W>, store: &S) -> Result<Cid>
where
    R: Read,
    W: Write,
    S: ContentStore + ?Sized,
{
    let context = entry.context();
    let cid = Cid::from_text(entry.header().link_bytes()).map_err(|e| {
        Error::format(context.offset, format!("{}: bad link field: {}", context, e))
    })?;

    let header = entry.header().with_empty_link();
    header
        .verify_checksum()
        .map_err(|e| Error::format(context.offset, format!("{}: {}", context, e)))?;

    let content = match store.get(&cid) {
        Ok(content) => content,
        Err(Error::NotFound { .. }) => return Err(Error::reference(context.clone(), cid.to_text())),
        Err(e) => return Err(e),
    };

    if content.len() as u64 != entry.size() {
        return Err(Error::format(
            context.offset,
            format!(
                "{}: header declares {} bytes but {} holds {}",
                context,
                entry.size(),
                cid,
                content.len()
            ),
        ));
    }

    writer.write_entry(&header, &content)?;
    Ok(cid)
}
