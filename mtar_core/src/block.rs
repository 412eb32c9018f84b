//! Fixed-size archive blocks.
//!
//! Every tar and mtar structure is a whole number of 512-byte blocks and all
//! padding is zero bytes.

use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// Size of one archive block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// One archive block.
pub type Block = [u8; BLOCK_SIZE];

const ZERO_BLOCK: Block = [0u8; BLOCK_SIZE];

/// Number of zero bytes needed to pad `len` bytes up to a block boundary.
pub fn padding_len(len: u64) -> u64 {
    let rem = len % BLOCK_SIZE as u64;
    if rem == 0 { 0 } else { BLOCK_SIZE as u64 - rem }
}

/// `len` rounded up to a whole number of blocks.
pub fn padded_len(len: u64) -> u64 {
    len + padding_len(len)
}

/// True if every byte of the block is zero.
pub fn is_zero_block(block: &Block) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Read exactly one block.
///
/// Returns `Ok(None)` when the reader is already at end of stream. A stream
/// that ends part way through a block is a format error reported at `offset`.
pub fn read_block<R: Read + ?Sized>(reader: &mut R, offset: u64) -> Result<Option<Block>> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(None),
        BLOCK_SIZE => Ok(Some(block)),
        n => Err(Error::format(
            offset,
            format!("truncated block: got {} of {} bytes", n, BLOCK_SIZE),
        )),
    }
}

/// Write `len` zero bytes.
pub fn write_zeros<W: Write + ?Sized>(writer: &mut W, mut len: u64) -> io::Result<()> {
    while len > 0 {
        let n = len.min(BLOCK_SIZE as u64) as usize;
        writer.write_all(&ZERO_BLOCK[..n])?;
        len -= n as u64;
    }
    Ok(())
}
