//! Content identifiers.
//!
//! A [`Cid`] is a CIDv1 with the `raw` codec and a `sha2-256` multihash:
//!
//! ```text
//! 0x01        CID version 1
//! 0x55        multicodec: raw
//! 0x12 0x20   multihash: sha2-256, 32 byte digest
//! ..32        digest
//! ```
//!
//! Its text form is the multibase base32 rendering: a `b` prefix followed by
//! lower-case RFC 4648 base32 without padding. The alphabet has no NUL and no
//! separators, so the text sits in the fixed-width tar link field with zero
//! padding and nothing else.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, HASH_SIZE, Hash};
use data_encoding::BASE32_NOPAD;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const CID_VERSION: u8 = 0x01;
const RAW_CODEC: u8 = 0x55;
const MULTIBASE_BASE32: char = 'b';

/// Length of the binary CID.
pub const CID_BYTES: usize = 4 + HASH_SIZE;

/// Length of the CID text.
pub const CID_TEXT_LEN: usize = 1 + (CID_BYTES * 8).div_ceil(5);

/// A content identifier for one blob.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid {
    hash: Hash,
}

impl Cid {
    /// The identifier for content with this digest.
    pub fn new(hash: Hash) -> Self {
        Self { hash }
    }

    /// The identifier for `data`.
    pub fn of(data: &[u8]) -> Self {
        Self::new(Hash::hash_bytes(data))
    }

    /// The content digest.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Binary CID.
    pub fn to_bytes(&self) -> [u8; CID_BYTES] {
        let mut out = [0u8; CID_BYTES];
        out[0] = CID_VERSION;
        out[1] = RAW_CODEC;
        out[2] = Algorithm::Sha256.multihash_code();
        out[3] = HASH_SIZE as u8;
        out[4..].copy_from_slice(self.hash.as_bytes());
        out
    }

    /// Parse a binary CID.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CID_BYTES {
            return Err(Error::invalid_cid(format!(
                "expected {} bytes, got {}",
                CID_BYTES,
                bytes.len()
            )));
        }
        if bytes[0] != CID_VERSION {
            return Err(Error::invalid_cid(format!(
                "unsupported CID version {}",
                bytes[0]
            )));
        }
        if bytes[1] != RAW_CODEC {
            return Err(Error::invalid_cid(format!(
                "unsupported codec 0x{:02x}",
                bytes[1]
            )));
        }
        if bytes[2] != Algorithm::Sha256.multihash_code() || bytes[3] != HASH_SIZE as u8 {
            return Err(Error::invalid_cid(format!(
                "unsupported multihash 0x{:02x}/{}",
                bytes[2], bytes[3]
            )));
        }

        let mut digest = [0u8; HASH_SIZE];
        digest.copy_from_slice(&bytes[4..]);
        Ok(Self::new(Hash::from_bytes(digest)))
    }

    /// Parse CID text as found in a link field, without its zero padding.
    pub fn from_text(text: &[u8]) -> Result<Self> {
        let Some((&prefix, body)) = text.split_first() else {
            return Err(Error::invalid_cid("empty identifier"));
        };
        if prefix != MULTIBASE_BASE32 as u8 {
            return Err(Error::invalid_cid(format!(
                "unsupported multibase prefix {:?}",
                prefix as char
            )));
        }
        // Only the canonical lower-case form is accepted.
        if !body
            .iter()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(b))
        {
            return Err(Error::invalid_cid("not lower-case base32"));
        }

        let upper = body.to_ascii_uppercase();
        let bytes = BASE32_NOPAD
            .decode(&upper)
            .map_err(|e| Error::invalid_cid(format!("bad base32: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Parse user input naming a blob: CID text, or the 64-digit hex
    /// sha2-256 digest of its content.
    pub fn parse_digest_or_text(input: &str) -> Result<Self> {
        if input.len() == HASH_SIZE * 2 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Self::new(Hash::from_hex(input)?));
        }
        input.parse()
    }

    /// The CID text.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(CID_TEXT_LEN);
        text.push(MULTIBASE_BASE32);
        text.push_str(&BASE32_NOPAD.encode(&self.to_bytes()).to_ascii_lowercase());
        text
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.to_text())
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s.as_bytes())
    }
}

impl From<Hash> for Cid {
    fn from(hash: Hash) -> Self {
        Self::new(hash)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}
