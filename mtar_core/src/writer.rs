//! Block-aligned tar stream writer.

use crate::block::{Block, padding_len, write_zeros};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::reader::Entry;
use std::io::{self, Read, Write};

/// Writes headers and data, keeping the stream block aligned.
pub struct TarWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> TarWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write a raw block (the mtar magic block, for one).
    pub fn write_block(&mut self, block: &Block) -> Result<()> {
        self.write_raw(block)
    }

    /// Write a header block.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.write_raw(header.as_bytes())
    }

    /// Copy exactly `len` bytes from `data`, then zero padding to the next
    /// block boundary.
    pub fn write_data<R: Read + ?Sized>(&mut self, data: &mut R, len: u64) -> Result<()> {
        self.copy_exact(data, len)?;
        self.write_padding(len)
    }

    /// Copy exactly `len` bytes from `data` with no padding.
    pub fn copy_exact<R: Read + ?Sized>(&mut self, data: &mut R, len: u64) -> Result<()> {
        let copied = io::copy(&mut data.take(len), &mut self.inner)?;
        self.position += copied;
        if copied != len {
            return Err(Error::format(
                self.position,
                format!("entry data ended after {} of {} bytes", copied, len),
            ));
        }
        Ok(())
    }

    /// Write a header followed by in-memory data and its padding.
    pub fn write_entry(&mut self, header: &Header, data: &[u8]) -> Result<()> {
        self.write_header(header)?;
        self.write_raw(data)?;
        self.write_padding(data.len() as u64)
    }

    /// Copy an entry through unchanged: header, data and padding as read.
    pub fn copy_entry<R: Read>(&mut self, entry: &mut Entry<'_, R>) -> Result<()> {
        self.write_header(entry.header())?;
        let len = entry.data_len();
        let copied = {
            let mut data = (&mut *entry).take(len);
            io::copy(&mut data, &mut self.inner)
        };
        let copied = match copied {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::format(entry.context().offset, e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        self.position += copied;
        let padding = entry.read_padding()?;
        self.write_raw(&padding)
    }

    /// Zero padding for `data_len` bytes of entry data.
    pub fn write_padding(&mut self, data_len: u64) -> Result<()> {
        let pad = padding_len(data_len);
        write_zeros(&mut self.inner, pad)?;
        self.position += pad;
        Ok(())
    }

    /// Write bytes verbatim, with no alignment applied.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Verbatim byte sink, used for trailers. Position tracking still applies.
impl<W: Write> Write for TarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;
    use crate::reader::TarReader;

    fn header(path: &str, size: u64) -> Header {
        let mut h = tar::Header::new_ustar();
        h.set_path(path).unwrap();
        h.set_size(size);
        h.set_entry_type(tar::EntryType::Regular);
        h.set_cksum();
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(h.as_bytes());
        Header::from_block(block)
    }

    #[test]
    fn test_write_entry_is_aligned() {
        let mut writer = TarWriter::new(Vec::new());
        writer.write_entry(&header("a", 5), b"hello").unwrap();
        assert_eq!(writer.position(), 1024);
        let out = writer.into_inner().unwrap();
        assert_eq!(out.len(), 1024);
        assert_eq!(&out[512..517], b"hello");
        assert!(out[517..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_data_exact_length() {
        let mut writer = TarWriter::new(Vec::new());
        writer.write_header(&header("a", 600)).unwrap();
        writer.write_data(&mut &[1u8; 600][..], 600).unwrap();
        assert_eq!(writer.position(), 512 + 1024);
    }

    #[test]
    fn test_write_data_short_source() {
        let mut writer = TarWriter::new(Vec::new());
        let err = writer.write_data(&mut &[1u8; 10][..], 20).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_copy_entry_keeps_padding_bytes() {
        let mut input = Vec::new();
        input.extend_from_slice(header("odd", 3).as_bytes());
        input.extend_from_slice(b"abc");
        let mut padding = vec![0u8; BLOCK_SIZE - 3];
        padding[10] = 0x7f;
        input.extend_from_slice(&padding);

        let mut reader = TarReader::new(&input[..]);
        let mut writer = TarWriter::new(Vec::new());
        let mut entry = reader.next_entry().unwrap().unwrap();
        writer.copy_entry(&mut entry).unwrap();
        assert_eq!(writer.into_inner().unwrap(), input);
    }

    #[test]
    fn test_copy_entry_truncated_data() {
        let mut input = Vec::new();
        input.extend_from_slice(header("short", 100).as_bytes());
        input.extend_from_slice(&[1u8; 40]);

        let mut reader = TarReader::new(&input[..]);
        let mut writer = TarWriter::new(Vec::new());
        let mut entry = reader.next_entry().unwrap().unwrap();
        let err = writer.copy_entry(&mut entry).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_reader_reads_writer_output() {
        let mut writer = TarWriter::new(Vec::new());
        writer.write_entry(&header("one", 3), b"one").unwrap();
        writer.write_entry(&header("two", 0), b"").unwrap();
        writer.write_raw(&[0u8; 1024]).unwrap();
        let out = writer.into_inner().unwrap();

        let mut reader = TarReader::new(&out[..]);
        let mut paths = Vec::new();
        while let Some(mut entry) = reader.next_entry().unwrap() {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            paths.push((entry.path().to_string(), data));
        }
        assert_eq!(
            paths,
            vec![("one".to_string(), b"one".to_vec()), ("two".to_string(), vec![])]
        );
    }
}
