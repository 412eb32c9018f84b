//! Error types for mtar_core.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using mtar_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Locates an archive member: its position in the entry sequence, its path
/// and the byte offset of its header block in the stream being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContext {
    /// Zero-based entry index (extension records count as entries).
    pub index: u64,
    /// Member path as recorded in the archive.
    pub path: String,
    /// Offset of the entry's header block.
    pub offset: u64,
}

impl fmt::Display for EntryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry #{} '{}' at byte {}",
            self.index, self.path, self.offset
        )
    }
}

/// Errors that can occur while reading, converting or storing archives.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred while reading or writing a stream or file.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Malformed tar or mtar framing. Fatal: the stream has no resync point.
    #[error("Malformed archive at byte {offset}: {reason}")]
    Format { offset: u64, reason: String },

    /// The archive holds something mtar cannot represent safely.
    #[error("Precondition failed for {entry}: {reason}")]
    Precondition { entry: EntryContext, reason: String },

    /// An entry could not be encoded without losing data.
    #[error("Cannot encode {entry}: {reason}")]
    Encoding { entry: EntryContext, reason: String },

    /// A well-formed mtar references content the store does not have.
    #[error("Missing content {cid} for {entry}")]
    Reference { entry: EntryContext, cid: String },

    /// Blob not found in store.
    #[error("Object not found: {cid}")]
    NotFound { cid: String },

    /// Invalid content identifier text or bytes.
    #[error("Invalid CID: {reason}")]
    InvalidCid { reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Object header bytes do not describe a valid store object.
    #[error("Invalid object header: {reason}")]
    InvalidObject { reason: String },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Store configuration could not be parsed.
    #[error("Invalid store config: {reason}")]
    InvalidConfig { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
}

impl Error {
    /// Create a Format error.
    pub fn format(offset: u64, reason: impl Into<String>) -> Self {
        Error::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a Precondition error.
    pub fn precondition(entry: EntryContext, reason: impl Into<String>) -> Self {
        Error::Precondition {
            entry,
            reason: reason.into(),
        }
    }

    /// Create an Encoding error.
    pub fn encoding(entry: EntryContext, reason: impl Into<String>) -> Self {
        Error::Encoding {
            entry,
            reason: reason.into(),
        }
    }

    /// Create a Reference error.
    pub fn reference(entry: EntryContext, cid: impl Into<String>) -> Self {
        Error::Reference {
            entry,
            cid: cid.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(cid: impl Into<String>) -> Self {
        Error::NotFound { cid: cid.into() }
    }

    /// Create an InvalidCid error.
    pub fn invalid_cid(reason: impl Into<String>) -> Self {
        Error::InvalidCid {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidObject error.
    pub fn invalid_object(reason: impl Into<String>) -> Self {
        Error::InvalidObject {
            reason: reason.into(),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// True for errors that mean the archive bytes themselves are malformed.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. })
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_context_display() {
        let ctx = EntryContext {
            index: 3,
            path: "dir/file.txt".to_string(),
            offset: 1536,
        };
        assert_eq!(ctx.to_string(), "entry #3 'dir/file.txt' at byte 1536");
    }

    #[test]
    fn test_error_messages_carry_location() {
        let ctx = EntryContext {
            index: 0,
            path: "a".to_string(),
            offset: 512,
        };
        let err = Error::reference(ctx, "bafkreiabc");
        let msg = err.to_string();
        assert!(msg.contains("bafkreiabc"));
        assert!(msg.contains("entry #0 'a' at byte 512"));

        let err = Error::format(1024, "truncated header block");
        assert!(err.is_format());
        assert_eq!(
            err.to_string(),
            "Malformed archive at byte 1024: truncated header block"
        );
    }
}
