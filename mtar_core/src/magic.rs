//! The mtar magic block.
//!
//! Every mtar stream opens with one full block:
//!
//! ```text
//! 0x00  2   0xDC 0xDF   keeps the stream from sniffing as ASCII/UTF-8/UTF-16
//! 0x02  4   "MTAR"      format tag
//! 0x06  2   version     u16 little-endian, currently 1
//! 0x08  ... zero padding to 512 bytes
//! ```

use crate::block::{BLOCK_SIZE, Block, read_block};
use crate::error::{Error, Result};
use std::io::Read;

/// Non-text marker bytes.
pub const MARKER: [u8; 2] = [0xdc, 0xdf];

/// Format tag.
pub const TAG: &[u8; 4] = b"MTAR";

/// The only defined format version.
pub const VERSION: u16 = 1;

/// Build the magic block for the current version.
pub fn magic_block() -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[0..2].copy_from_slice(&MARKER);
    block[2..6].copy_from_slice(TAG);
    block[6..8].copy_from_slice(&VERSION.to_le_bytes());
    block
}

/// Check a magic block and return its version.
pub fn parse_magic(block: &Block) -> Result<u16> {
    if block[0..2] != MARKER || &block[2..6] != TAG {
        return Err(Error::format(
            0,
            format!("not an mtar stream: leading bytes {:02x?}", &block[0..6]),
        ));
    }

    let version = u16::from_le_bytes([block[6], block[7]]);
    if version != VERSION {
        return Err(Error::format(
            6,
            format!("unsupported mtar version {} (expected {})", version, VERSION),
        ));
    }

    if block[8..].iter().any(|&b| b != 0) {
        return Err(Error::format(8, "magic block padding is not zero"));
    }

    Ok(version)
}

/// Read and validate the magic block at the start of `reader`.
pub fn read_magic<R: Read + ?Sized>(reader: &mut R) -> Result<u16> {
    match read_block(reader, 0)? {
        Some(block) => parse_magic(&block),
        None => Err(Error::format(0, "empty stream: missing mtar magic block")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_layout() {
        let block = magic_block();
        assert_eq!(&block[..8], b"\xdc\xdfMTAR\x01\x00");
        assert!(block[8..].iter().all(|&b| b == 0));
        assert_eq!(parse_magic(&block).unwrap(), 1);
    }

    #[test]
    fn test_bad_tag() {
        let mut block = magic_block();
        block[2..6].copy_from_slice(b"MZIP");
        assert!(parse_magic(&block).unwrap_err().is_format());

        // A plain tar header is rejected.
        let mut block = [0u8; BLOCK_SIZE];
        block[..4].copy_from_slice(b"file");
        assert!(parse_magic(&block).unwrap_err().is_format());
    }

    #[test]
    fn test_bad_version() {
        let mut block = magic_block();
        block[6..8].copy_from_slice(&2u16.to_le_bytes());
        let err = parse_magic(&block).unwrap_err();
        assert!(err.to_string().contains("unsupported mtar version 2"));

        // Big-endian 1 reads as 256.
        block[6..8].copy_from_slice(&1u16.to_be_bytes());
        assert!(parse_magic(&block).is_err());
    }

    #[test]
    fn test_nonzero_padding() {
        let mut block = magic_block();
        block[511] = 1;
        assert!(parse_magic(&block).is_err());
    }

    #[test]
    fn test_read_magic_short_stream() {
        assert!(read_magic(&mut &[][..]).unwrap_err().is_format());
        let short = &magic_block()[..100];
        assert!(read_magic(&mut &short[..]).unwrap_err().is_format());
    }
}
