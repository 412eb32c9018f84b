//! Forward-only tar stream reader.
//!
//! [`TarReader::next_entry`] hands out one [`Entry`] at a time. An entry
//! borrows the reader, reads its own data through `Read`, and whatever it
//! leaves unread is skipped before the next header. Nothing seeks, so stdin
//! and pipes work.
//!
//! The first all-zero header block ends the archive. That block and every
//! byte after it form the trailer, which [`TarReader::copy_trailer`] copies
//! out untouched so archives with record padding survive a round trip.

use crate::block::{BLOCK_SIZE, Block, is_zero_block, padding_len, read_block};
use crate::error::{EntryContext, Error, Result};
use crate::header::{EntryType, Header, UnknownEntryType};
use crate::magic::read_magic;
use std::io::{self, Cursor, Read, Write};

/// Extension records (PAX and GNU long names) are buffered in memory; larger
/// ones are rejected.
pub const MAX_EXTENSION_SIZE: u64 = 1024 * 1024;

/// How data blocks are laid out after headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Plain tar: file content follows its header.
    Tar,
    /// mtar: file content lives in a content store, headers only.
    Mtar,
}

enum State {
    Headers,
    Trailer(Block),
    Done,
}

/// Values an extension record sets for the entry after it.
#[derive(Debug, Default)]
struct Overrides {
    size: Option<u64>,
    path: Option<String>,
}

/// Reads entries from a tar or mtar stream.
pub struct TarReader<R> {
    inner: R,
    framing: Framing,
    offset: u64,
    next_index: u64,
    remaining: u64,
    padding: u64,
    buffered: Option<Cursor<Vec<u8>>>,
    overrides: Overrides,
    state: State,
}

impl<R: Read> TarReader<R> {
    /// Read a plain tar stream.
    pub fn new(inner: R) -> Self {
        Self::with_framing(inner, Framing::Tar, 0)
    }

    /// Read an mtar stream, consuming and validating its magic block first.
    pub fn mtar(mut inner: R) -> Result<Self> {
        read_magic(&mut inner)?;
        Ok(Self::with_framing(inner, Framing::Mtar, BLOCK_SIZE as u64))
    }

    fn with_framing(inner: R, framing: Framing, offset: u64) -> Self {
        Self {
            inner,
            framing,
            offset,
            next_index: 0,
            remaining: 0,
            padding: 0,
            buffered: None,
            overrides: Overrides::default(),
            state: State::Headers,
        }
    }

    /// The framing this reader expects.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Bytes consumed from the underlying stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Advance to the next entry.
    ///
    /// Returns `Ok(None)` at the end-of-archive block or at a clean end of
    /// stream on a block boundary.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'_, R>>> {
        if !matches!(self.state, State::Headers) {
            return Ok(None);
        }
        self.skip_rest()?;

        let header_offset = self.offset;
        let Some(block) = read_block(&mut self.inner, header_offset)? else {
            self.state = State::Done;
            return Ok(None);
        };
        self.offset += BLOCK_SIZE as u64;

        if is_zero_block(&block) {
            self.state = State::Trailer(block);
            return Ok(None);
        }

        let header = Header::from_block(block);
        let entry_type = header.entry_type();
        let is_file = matches!(entry_type, Ok(t) if t.is_file());
        let is_extension = matches!(entry_type, Ok(t) if t.is_extension());
        let elided = is_file && self.framing == Framing::Mtar;

        // mtar file headers carry a patched link field; their checksum only
        // holds once the link field is restored.
        if !elided {
            header
                .verify_checksum()
                .map_err(|e| Error::format(header_offset, e.to_string()))?;
        }

        let declared = header
            .size()
            .map_err(|e| Error::format(header_offset, e.to_string()))?;

        let (size, path) = if is_extension {
            (declared, header.path())
        } else {
            let overrides = std::mem::take(&mut self.overrides);
            (
                overrides.size.unwrap_or(declared),
                overrides.path.unwrap_or_else(|| header.path()),
            )
        };

        let data_len = match entry_type {
            Ok(_) if elided => 0,
            Ok(t) if t.has_data() => size,
            Ok(_) => 0,
            // Unknown types are framed by their size field.
            Err(_) => size,
        };
        let padding = padding_len(data_len);
        if data_len.checked_add(padding).is_none() {
            return Err(Error::format(
                header_offset,
                format!("entry size {} does not fit in a block-aligned stream", data_len),
            ));
        }
        self.remaining = data_len;
        self.padding = padding;

        if is_extension {
            let data = self.read_extension(header_offset, data_len)?;
            if let Ok(t) = entry_type {
                self.apply_extension(t, header_offset, &data)?;
            }
            self.buffered = Some(Cursor::new(data));
        }

        let context = EntryContext {
            index: self.next_index,
            path,
            offset: header_offset,
        };
        self.next_index += 1;

        Ok(Some(Entry {
            reader: self,
            header,
            entry_type,
            size,
            data_len,
            context,
        }))
    }

    /// Copy the end-of-archive block and everything after it to `out`.
    ///
    /// Call once `next_entry` has returned `None`. Returns the number of bytes
    /// copied, zero when the stream simply ended.
    pub fn copy_trailer<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Trailer(block) => {
                out.write_all(&block)?;
                let rest = io::copy(&mut self.inner, out)?;
                self.offset += rest;
                Ok(BLOCK_SIZE as u64 + rest)
            }
            State::Done => Ok(0),
            State::Headers => {
                self.state = State::Headers;
                Err(Error::format(
                    self.offset,
                    "trailer requested before the end of the archive",
                ))
            }
        }
    }

    /// Return the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Discard unread data and padding of the current entry.
    fn skip_rest(&mut self) -> Result<()> {
        self.buffered = None;
        let pending = self
            .remaining
            .checked_add(self.padding)
            .ok_or_else(|| Error::format(self.offset, "entry size overflows the stream offset"))?;
        if pending == 0 {
            return Ok(());
        }

        let skipped = io::copy(&mut (&mut self.inner).take(pending), &mut io::sink())?;
        self.offset += skipped;
        if skipped < pending {
            return Err(Error::format(
                self.offset,
                format!("stream ended {} bytes short of entry end", pending - skipped),
            ));
        }
        self.remaining = 0;
        self.padding = 0;
        Ok(())
    }

    fn read_extension(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len > MAX_EXTENSION_SIZE {
            return Err(Error::format(
                offset,
                format!(
                    "extension record of {} bytes exceeds {} byte limit",
                    len, MAX_EXTENSION_SIZE
                ),
            ));
        }

        let mut data = vec![0u8; len as usize];
        self.inner.read_exact(&mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format(offset, "stream ended inside extension record")
            } else {
                e.into()
            }
        })?;
        self.offset += len;
        self.remaining = 0;
        Ok(data)
    }

    fn apply_extension(&mut self, entry_type: EntryType, offset: u64, data: &[u8]) -> Result<()> {
        match entry_type {
            EntryType::PaxExtended => {
                for (key, value) in
                    pax_records(data).map_err(|reason| Error::format(offset, reason))?
                {
                    match key {
                        b"size" => {
                            let size = std::str::from_utf8(value)
                                .ok()
                                .and_then(|v| v.parse::<u64>().ok())
                                .ok_or_else(|| {
                                    Error::format(
                                        offset,
                                        format!(
                                            "invalid PAX size {:?}",
                                            String::from_utf8_lossy(value)
                                        ),
                                    )
                                })?;
                            self.overrides.size = Some(size);
                        }
                        b"path" => {
                            self.overrides.path = Some(String::from_utf8_lossy(value).into_owned());
                        }
                        _ => {}
                    }
                }
            }
            EntryType::GnuLongName => {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                self.overrides.path = Some(String::from_utf8_lossy(&data[..end]).into_owned());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Split a PAX extended header payload into `key=value` records.
///
/// Each record is `"<len> <key>=<value>\n"` where `len` counts the whole
/// record including itself.
fn pax_records(mut data: &[u8]) -> std::result::Result<Vec<(&[u8], &[u8])>, String> {
    let mut records = Vec::new();
    while !data.is_empty() {
        let space = data
            .iter()
            .position(|&b| b == b' ')
            .ok_or("PAX record without length")?;
        let len = std::str::from_utf8(&data[..space])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or("PAX record with invalid length")?;
        if len <= space + 1 || len > data.len() {
            return Err(format!("PAX record length {} out of range", len));
        }

        let record = &data[space + 1..len];
        let record = record.strip_suffix(b"\n").ok_or("PAX record not newline terminated")?;
        let eq = record
            .iter()
            .position(|&b| b == b'=')
            .ok_or("PAX record without '='")?;
        records.push((&record[..eq], &record[eq + 1..]));
        data = &data[len..];
    }
    Ok(records)
}

/// One archive member being read.
pub struct Entry<'a, R: Read> {
    reader: &'a mut TarReader<R>,
    header: Header,
    entry_type: std::result::Result<EntryType, UnknownEntryType>,
    size: u64,
    data_len: u64,
    context: EntryContext,
}

impl<R: Read> Entry<'_, R> {
    /// The header block as read.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The parsed type flag.
    pub fn entry_type(&self) -> std::result::Result<EntryType, UnknownEntryType> {
        self.entry_type
    }

    /// Length of the member's content, after any PAX size override.
    ///
    /// For file entries in an mtar stream this is the length of the content
    /// held in the store, not of anything in the stream.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Data bytes that follow the header in this stream.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Member path, after any long-name override.
    pub fn path(&self) -> &str {
        &self.context.path
    }

    /// Index, path and offset of this entry.
    pub fn context(&self) -> &EntryContext {
        &self.context
    }

    /// Data bytes not yet read.
    pub fn remaining(&self) -> u64 {
        match &self.reader.buffered {
            Some(cursor) => cursor.get_ref().len() as u64 - cursor.position(),
            None => self.reader.remaining,
        }
    }

    /// Read the zero padding that follows the data.
    ///
    /// All data must have been read first. The bytes are returned as found so
    /// callers can copy or check them.
    pub fn read_padding(&mut self) -> Result<Vec<u8>> {
        if self.remaining() != 0 {
            return Err(Error::format(
                self.reader.offset,
                format!(
                    "{}: padding requested with {} data bytes unread",
                    self.context,
                    self.remaining()
                ),
            ));
        }

        let reader = &mut *self.reader;
        let mut padding = vec![0u8; reader.padding as usize];
        reader.inner.read_exact(&mut padding).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format(reader.offset, "stream ended inside block padding")
            } else {
                e.into()
            }
        })?;
        reader.offset += reader.padding;
        reader.padding = 0;
        Ok(padding)
    }
}

impl<R: Read> Read for Entry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let reader = &mut *self.reader;
        if let Some(cursor) = reader.buffered.as_mut() {
            return cursor.read(buf);
        }
        if reader.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(reader.remaining)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let n = reader.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "archive ended with {} bytes of {} unread",
                    reader.remaining, self.context
                ),
            ));
        }
        reader.remaining -= n as u64;
        reader.offset += n as u64;
        Ok(n)
    }
}
