//! Tar header blocks as immutable values.
//!
//! A [`Header`] owns a copy of one 512-byte header block. Field accessors
//! parse on demand and the only modification the format needs, replacing the
//! link field, returns a new `Header` instead of patching bytes in place.
//!
//! ```text
//! 0    100  name
//! 100    8  mode
//! 108    8  uid
//! 116    8  gid
//! 124   12  size      (octal, or GNU base-256 when the high bit is set)
//! 136   12  mtime
//! 148    8  chksum
//! 156    1  typeflag
//! 157  100  linkname  (carries the CID in mtar streams)
//! 257    6  magic     ("ustar\0" for POSIX ustar)
//! 263    2  version
//! 265   32  uname
//! 297   32  gname
//! 329    8  devmajor
//! 337    8  devminor
//! 345  155  prefix    (ustar only)
//! ```

use crate::block::Block;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Offset of the link field within a header block.
pub const LINK_OFFSET: usize = 157;

/// Width of the link field in bytes.
pub const LINK_LEN: usize = 100;

const NAME: Range<usize> = 0..100;
const SIZE: Range<usize> = 124..136;
const CHKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINK: Range<usize> = LINK_OFFSET..LINK_OFFSET + LINK_LEN;
const MAGIC: Range<usize> = 257..263;
const PREFIX: Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Problems found while interpreting header fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// A numeric field holds something other than octal digits or base-256.
    #[error("invalid {field} field: {value:?}")]
    InvalidNumeric { field: &'static str, value: String },

    /// The stored checksum does not match the header bytes.
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    /// A value is too wide for the field it must be written to.
    #[error("{field} value is {len} bytes, field holds {max}")]
    FieldOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// A type flag byte outside the set this crate knows how to frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown entry type flag 0x{0:02x}")]
pub struct UnknownEntryType(pub u8);

/// Entry kinds identified by the header type flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file (`'0'`, or NUL in pre-POSIX archives).
    Regular,
    /// Hard link (`'1'`).
    HardLink,
    /// Symbolic link (`'2'`).
    Symlink,
    /// Character device (`'3'`).
    Char,
    /// Block device (`'4'`).
    Block,
    /// Directory (`'5'`).
    Directory,
    /// FIFO (`'6'`).
    Fifo,
    /// Contiguous file (`'7'`), treated as a regular file.
    Contiguous,
    /// PAX extended header for the next entry (`'x'`).
    PaxExtended,
    /// PAX global extended header (`'g'`).
    PaxGlobal,
    /// GNU long name for the next entry (`'L'`).
    GnuLongName,
    /// GNU long link name for the next entry (`'K'`).
    GnuLongLink,
}

impl EntryType {
    /// Name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Regular => "regular",
            EntryType::HardLink => "hardlink",
            EntryType::Symlink => "symlink",
            EntryType::Char => "char",
            EntryType::Block => "block",
            EntryType::Directory => "directory",
            EntryType::Fifo => "fifo",
            EntryType::Contiguous => "contiguous",
            EntryType::PaxExtended => "pax-extended",
            EntryType::PaxGlobal => "pax-global",
            EntryType::GnuLongName => "gnu-long-name",
            EntryType::GnuLongLink => "gnu-long-link",
        }
    }

    /// File content entries, the ones routed through the content store.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryType::Regular | EntryType::Contiguous)
    }

    /// Records that describe the entry after them rather than a member.
    pub fn is_extension(&self) -> bool {
        matches!(
            self,
            EntryType::PaxExtended
                | EntryType::PaxGlobal
                | EntryType::GnuLongName
                | EntryType::GnuLongLink
        )
    }

    /// Whether data blocks follow the header in a plain tar stream.
    ///
    /// Links, devices, directories and FIFOs never carry data whatever their
    /// size field says.
    pub fn has_data(&self) -> bool {
        self.is_file() || self.is_extension()
    }
}

impl TryFrom<u8> for EntryType {
    type Error = UnknownEntryType;

    fn try_from(flag: u8) -> Result<Self, Self::Error> {
        match flag {
            b'0' | b'\0' => Ok(EntryType::Regular),
            b'1' => Ok(EntryType::HardLink),
            b'2' => Ok(EntryType::Symlink),
            b'3' => Ok(EntryType::Char),
            b'4' => Ok(EntryType::Block),
            b'5' => Ok(EntryType::Directory),
            b'6' => Ok(EntryType::Fifo),
            b'7' => Ok(EntryType::Contiguous),
            b'x' => Ok(EntryType::PaxExtended),
            b'g' => Ok(EntryType::PaxGlobal),
            b'L' => Ok(EntryType::GnuLongName),
            b'K' => Ok(EntryType::GnuLongLink),
            other => Err(UnknownEntryType(other)),
        }
    }
}

/// One tar header block.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    bytes: Block,
}

impl Header {
    /// Wrap a raw header block.
    pub fn from_block(bytes: Block) -> Self {
        Self { bytes }
    }

    /// The raw header bytes.
    pub fn as_bytes(&self) -> &Block {
        &self.bytes
    }

    /// The raw type flag byte.
    pub fn type_flag(&self) -> u8 {
        self.bytes[TYPEFLAG]
    }

    /// The parsed type flag.
    pub fn entry_type(&self) -> Result<EntryType, UnknownEntryType> {
        EntryType::try_from(self.type_flag())
    }

    /// Declared data length.
    pub fn size(&self) -> Result<u64, HeaderError> {
        parse_numeric("size", &self.bytes[SIZE])
    }

    /// Member path, joining the ustar prefix when present.
    pub fn path(&self) -> String {
        let name = cstr(&self.bytes[NAME]);
        let prefix = cstr(&self.bytes[PREFIX]);
        if self.is_ustar() && !prefix.is_empty() {
            format!(
                "{}/{}",
                String::from_utf8_lossy(prefix),
                String::from_utf8_lossy(name)
            )
        } else {
            String::from_utf8_lossy(name).into_owned()
        }
    }

    /// True for POSIX ustar headers (GNU headers use the prefix area for
    /// other fields).
    pub fn is_ustar(&self) -> bool {
        &self.bytes[MAGIC] == USTAR_MAGIC
    }

    /// The raw link field.
    pub fn link_field(&self) -> &[u8] {
        &self.bytes[LINK]
    }

    /// The link field up to its first NUL.
    pub fn link_bytes(&self) -> &[u8] {
        cstr(self.link_field())
    }

    /// True if every byte of the link field is zero.
    pub fn link_is_empty(&self) -> bool {
        self.link_field().iter().all(|&b| b == 0)
    }

    /// A copy of this header with the link field set to `value`, zero padded.
    ///
    /// No other byte changes, the checksum included.
    pub fn with_link(&self, value: &[u8]) -> Result<Header, HeaderError> {
        if value.len() > LINK_LEN {
            return Err(HeaderError::FieldOverflow {
                field: "link",
                len: value.len(),
                max: LINK_LEN,
            });
        }
        let mut bytes = self.bytes;
        bytes[LINK].fill(0);
        bytes[LINK_OFFSET..LINK_OFFSET + value.len()].copy_from_slice(value);
        Ok(Header { bytes })
    }

    /// A copy of this header with an all-zero link field.
    pub fn with_empty_link(&self) -> Header {
        let mut bytes = self.bytes;
        bytes[LINK].fill(0);
        Header { bytes }
    }

    /// Check the stored checksum against the header bytes.
    ///
    /// Both the POSIX unsigned sum and the historic signed sum are accepted.
    pub fn verify_checksum(&self) -> Result<(), HeaderError> {
        let stored = parse_numeric("chksum", &self.bytes[CHKSUM])?;
        let (unsigned, signed) = self.compute_checksums();
        if stored == unsigned || Some(stored) == u64::try_from(signed).ok() {
            Ok(())
        } else {
            Err(HeaderError::ChecksumMismatch {
                stored,
                computed: unsigned,
            })
        }
    }

    fn compute_checksums(&self) -> (u64, i64) {
        let mut unsigned = 0u64;
        let mut signed = 0i64;
        for (i, &b) in self.bytes.iter().enumerate() {
            let b = if CHKSUM.contains(&i) { b' ' } else { b };
            unsigned += b as u64;
            signed += b as i8 as i64;
        }
        (unsigned, signed)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("path", &self.path())
            .field("type_flag", &(self.type_flag() as char))
            .field("size", &self.size())
            .finish()
    }
}

/// Bytes up to the first NUL.
fn cstr(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Parse a numeric header field: octal text, or GNU base-256 when the high
/// bit of the first byte is set.
fn parse_numeric(field: &'static str, bytes: &[u8]) -> Result<u64, HeaderError> {
    let invalid = || HeaderError::InvalidNumeric {
        field,
        value: String::from_utf8_lossy(bytes).into_owned(),
    };

    if bytes.first().is_some_and(|&b| b & 0x80 != 0) {
        // 0xff marks a negative base-256 number, never valid for these fields.
        if bytes[0] == 0xff {
            return Err(invalid());
        }
        let mut value = (bytes[0] & 0x7f) as u64;
        for &b in &bytes[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(b as u64))
                .ok_or_else(invalid)?;
        }
        return Ok(value);
    }

    let digits = bytes
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != b' ' && b != 0);
    let mut value = 0u64;
    let mut seen = 0usize;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(invalid());
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add((b - b'0') as u64))
            .ok_or_else(invalid)?;
        seen += 1;
    }

    // Anything after the terminator other than spaces and NULs is garbage.
    let consumed = bytes.iter().take_while(|&&b| b == b' ').count() + seen;
    if bytes[consumed..].iter().any(|&b| b != b' ' && b != 0) {
        return Err(invalid());
    }
    Ok(value)
}
