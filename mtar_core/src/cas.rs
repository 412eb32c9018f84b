//! The content store boundary.
//!
//! Encoding and decoding only ever need two things from a store: put bytes
//! in and get a [`Cid`] back, and get bytes out for a `Cid`. Listing,
//! deletion and transport belong to whoever operates the store.

use crate::cid::Cid;
use crate::error::Result;
use crate::hash::{Hash, Hasher};
use std::io::{self, Read, Write};

/// Input is read and hashed in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A store of blobs keyed by the digest of their content.
///
/// Implementations must be safe to share between threads, including
/// concurrent `put` calls racing on identical content.
pub trait ContentStore: Send + Sync {
    /// Store everything `reader` yields and return its identifier.
    ///
    /// Storing content that is already present computes the full digest and
    /// then leaves the existing copy alone.
    fn put(&self, reader: &mut dyn Read) -> Result<Cid>;

    /// Fetch the content for `cid`, or [`Error::NotFound`](crate::Error::NotFound).
    fn get(&self, cid: &Cid) -> Result<Vec<u8>>;

    /// Store an in-memory buffer.
    fn put_bytes(&self, data: &[u8]) -> Result<Cid> {
        self.put(&mut &data[..])
    }
}

impl<S: ContentStore + ?Sized> ContentStore for &S {
    fn put(&self, reader: &mut dyn Read) -> Result<Cid> {
        (**self).put(reader)
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        (**self).get(cid)
    }
}

impl<S: ContentStore + ?Sized> ContentStore for std::sync::Arc<S> {
    fn put(&self, reader: &mut dyn Read) -> Result<Cid> {
        (**self).put(reader)
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        (**self).get(cid)
    }
}

/// Copy `reader` into `sink` in `CHUNK_SIZE` pieces while hashing.
///
/// Returns the digest and the number of bytes copied.
pub(crate) fn copy_hashing<W: Write + ?Sized>(
    reader: &mut dyn Read,
    sink: &mut W,
) -> Result<(Hash, u64)> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((hasher.finalize(), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_copy_hashing_large_input() {
        let data: Vec<u8> = (0..(3 * CHUNK_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let (hash, len) = copy_hashing(&mut &data[..], &mut out).unwrap();
        assert_eq!(len, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(hash, Hash::hash_bytes(&data));
    }

    #[test]
    fn test_copy_hashing_short_reads() {
        let data = vec![42u8; 10_000];
        let mut reader = Trickle {
            data: &data,
            step: 7,
        };
        let (hash, len) = copy_hashing(&mut reader, &mut io::sink()).unwrap();
        assert_eq!(len, 10_000);
        assert_eq!(hash, Hash::hash_bytes(&data));
    }
}
