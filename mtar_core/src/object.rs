//! Binary object format and encoding.
//!
//! Blobs are stored with a 16-byte header followed by the payload:
//!
//! ```text
//! 0x00  4   "MCAS" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   algo: 1=sha2-256
//! 0x06  1   compression: 0=none, 1=zstd
//! 0x07  1   reserved (must be 0)
//! 0x08  8   content_len (u64 LE) - uncompressed size
//! 0x10  ... payload
//! ```

use crate::error::{Error, Result};
use crate::hash::Algorithm;

/// Magic bytes at the start of every object file.
pub const MAGIC: &[u8; 4] = b"MCAS";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::invalid_config(format!(
                "Invalid compression type: {}",
                value
            ))),
        }
    }

    /// Get the string name of this compression type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Zstd => "zstd",
        }
    }

    /// Parse from the name used in config files.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(CompressionType::None),
            "zstd" => Ok(CompressionType::Zstd),
            _ => Err(Error::invalid_config(format!(
                "Unknown compression: {}",
                s
            ))),
        }
    }
}

/// A 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object format version.
    pub version: u8,
    /// Hash algorithm used.
    pub algorithm: Algorithm,
    /// Compression applied to the payload.
    pub compression: CompressionType,
    /// Length of the content in bytes (before compression).
    pub content_len: u64,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(algorithm: Algorithm, compression: CompressionType, content_len: u64) -> Self {
        Self {
            version: VERSION,
            algorithm,
            compression,
            content_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.algorithm.id();
        buf[6] = self.compression.to_u8();
        // buf[7] reserved
        buf[8..16].copy_from_slice(&self.content_len.to_le_bytes());

        buf
    }

    /// Decode a header from a 16-byte array.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::invalid_object(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(Error::invalid_object(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        let version = buf[4];
        if version != VERSION {
            return Err(Error::invalid_object(format!(
                "Unsupported version: {} (expected {})",
                version, VERSION
            )));
        }

        let algorithm =
            Algorithm::from_id(buf[5]).map_err(|e| Error::invalid_object(e.to_string()))?;
        let compression =
            CompressionType::from_u8(buf[6]).map_err(|e| Error::invalid_object(e.to_string()))?;

        if buf[7] != 0 {
            return Err(Error::invalid_object(format!(
                "Reserved byte must be 0, got {}",
                buf[7]
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let content_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            version,
            algorithm,
            compression,
            content_len,
        })
    }
}
