//! # mtar core
//!
//! Lossless conversion between tar archives and mtar, a tar-compatible stream
//! whose file entries keep only their headers. File content lives in a
//! content-addressable store, and each file header names its content by CID
//! in the otherwise unused link field.
//!
//! ## Features
//!
//! - Streaming tar reader and writer, no seeking required
//! - Byte-exact round trip, end-of-archive padding included
//! - CIDv1 (raw, sha2-256) content identifiers
//! - In-memory and on-disk content stores behind one trait
//! - Optional zstd compression of stored blobs
//!
//! ## Example
//!
//! ```no_run
//! use mtar_core::{ContentStore, Store, StoreConfig, decode, encode};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::init("./my-store", StoreConfig::default())?;
//!
//! // Move file content into the store
//! let stats = encode(File::open("backup.tar")?, File::create("backup.mtar")?, &store)?;
//! println!("Stored {} files", stats.files);
//!
//! // Rebuild the original archive
//! decode(File::open("backup.mtar")?, File::create("restored.tar")?, &store)?;
//! # Ok(())
//! # }
//! ```

mod block;
mod cas;
mod cid;
mod decode;
mod encode;
mod error;
mod hash;
mod header;
mod magic;
mod memory;
mod object;
mod reader;
mod store;
mod writer;

pub use block::{BLOCK_SIZE, Block};
pub use cas::{CHUNK_SIZE, ContentStore};
pub use cid::{CID_TEXT_LEN, Cid};
pub use decode::{DecodeStats, decode, verify};
pub use encode::{EncodeStats, encode};
pub use error::{EntryContext, Error, Result};
pub use hash::{Algorithm, Hash};
pub use header::{EntryType, Header, HeaderError, LINK_LEN, LINK_OFFSET, UnknownEntryType};
pub use magic::{magic_block, read_magic};
pub use memory::MemoryStore;
pub use object::{CompressionType, ObjectHeader};
pub use reader::{Entry, Framing, TarReader};
pub use store::{BlobInfo, DEFAULT_ZSTD_LEVEL, Store, StoreConfig};
pub use writer::TarWriter;
