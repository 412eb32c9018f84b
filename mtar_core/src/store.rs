//! Durable content store on the local filesystem.
//!
//! ```text
//! <root>/config                              version, algorithm, compression
//! <root>/objects/sha2-256/<2 hex>/<62 hex>   one object per blob
//! <root>/tmp/                                in-flight writes
//! ```

use crate::cas::{ContentStore, copy_hashing};
use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader};
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default zstd level for compressed stores.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Settings fixed when a store is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Digest algorithm used for keys.
    pub algorithm: Algorithm,
    /// Compression applied to stored payloads.
    pub compression: CompressionType,
    /// zstd level, used when `compression` is zstd.
    pub level: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            compression: CompressionType::None,
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl StoreConfig {
    /// Config file contents.
    fn render(&self) -> String {
        format!(
            "version=1\nalgo={}\ncompression={}\nlevel={}\n",
            self.algorithm.as_str(),
            self.compression.as_str(),
            self.level
        )
    }

    /// Parse config file contents.
    fn parse(content: &str) -> Result<Self> {
        let mut version = None;
        let mut algo = None;
        let mut config = StoreConfig::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                match key.trim() {
                    "version" => version = Some(value),
                    "algo" => algo = Some(value),
                    "compression" => config.compression = CompressionType::parse(value)?,
                    "level" => {
                        config.level = value.parse().map_err(|_| {
                            Error::invalid_config(format!("Invalid level: {}", value))
                        })?
                    }
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_config(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_config("Missing algo in config"))?;
        config.algorithm = Algorithm::parse(algo_str)?;
        Ok(config)
    }
}

/// Facts about one stored blob.
#[derive(Debug, Clone, Serialize)]
pub struct BlobInfo {
    pub cid: Cid,
    pub size: u64,
    pub size_on_disk: u64,
    pub compression: &'static str,
    pub path: PathBuf,
}

/// A content-addressed store rooted at a directory.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
}

impl Store {
    /// Initialize a new store at the given path.
    pub fn init<P: AsRef<Path>>(root: P, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if root.join("config").exists() {
            return Err(Error::invalid_store(&root, "store already initialized"));
        }

        fs::create_dir_all(root.join("objects").join(config.algorithm.as_str()))?;
        fs::create_dir_all(root.join("tmp"))?;
        fs::write(root.join("config"), config.render())?;

        debug!(root = %root.display(), compression = config.compression.as_str(), "initialized store");
        Ok(Self { root, config })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config = StoreConfig::parse(&fs::read_to_string(&config_path)?)?;

        if !root.join("objects").join(config.algorithm.as_str()).exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        // Older stores or manual cleanup may have removed it.
        fs::create_dir_all(root.join("tmp"))?;

        Ok(Self { root, config })
    }

    /// Get the path to an object file given its hash.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("objects")
            .join(self.config.algorithm.as_str())
            .join(hash.prefix())
            .join(hash.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the configuration of this store.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True if content for `cid` is stored.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.object_path(cid.hash()).exists()
    }

    /// Describe a stored blob without reading its payload.
    pub fn stat(&self, cid: &Cid) -> Result<BlobInfo> {
        let path = self.object_path(cid.hash());
        let (file, header) = self.open_object(cid, &path)?;
        let size_on_disk = file.get_ref().metadata()?.len();
        Ok(BlobInfo {
            cid: *cid,
            size: header.content_len,
            size_on_disk,
            compression: header.compression.as_str(),
            path,
        })
    }

    /// Write a blob's content to `writer`.
    pub fn cat_blob<W: Write>(&self, cid: &Cid, mut writer: W) -> Result<()> {
        let content = self.get(cid)?;
        writer.write_all(&content)?;
        Ok(())
    }

    /// Store the contents of a file.
    pub fn put_file(&self, path: &Path) -> Result<Cid> {
        let mut file = fs::File::open(path)?;
        self.put(&mut file)
    }

    fn open_object(&self, cid: &Cid, path: &Path) -> Result<(BufReader<fs::File>, ObjectHeader)> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_found(cid.to_text()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut header_buf = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header_buf)
            .map_err(|e| Error::corrupted_object(path, format!("Unreadable header: {}", e)))?;
        let header = ObjectHeader::decode(&header_buf)
            .map_err(|e| Error::corrupted_object(path, e.to_string()))?;
        Ok((reader, header))
    }
}

impl ContentStore for Store {
    fn put(&self, reader: &mut dyn Read) -> Result<Cid> {
        let mut temp = tempfile::NamedTempFile::new_in(self.root.join("tmp"))?;

        // Placeholder until the content length is known.
        temp.write_all(&[0u8; HEADER_SIZE])?;

        let (hash, content_len) = match self.config.compression {
            CompressionType::None => copy_hashing(reader, temp.as_file_mut())?,
            CompressionType::Zstd => {
                let mut encoder =
                    zstd::stream::write::Encoder::new(temp.as_file_mut(), self.config.level)?;
                let result = copy_hashing(reader, &mut encoder)?;
                encoder.finish()?;
                result
            }
        };

        let cid = Cid::new(hash);
        let obj_path = self.object_path(&hash);
        if obj_path.exists() {
            debug!(%cid, "blob already stored");
            return Ok(cid);
        }

        let header = ObjectHeader::new(self.config.algorithm, self.config.compression, content_len);
        let file = temp.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_all()?;

        if let Some(parent) = obj_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // First writer wins. A concurrent writer of the same digest wrote the
        // same bytes, so losing the race is success.
        match temp.persist_noclobber(&obj_path) {
            Ok(_) => debug!(%cid, size = content_len, "stored blob"),
            Err(err) if obj_path.exists() => {
                debug!(%cid, error = %err.error, "blob stored concurrently");
            }
            Err(err) => return Err(err.into()),
        }

        Ok(cid)
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        let path = self.object_path(cid.hash());
        let (mut reader, header) = self.open_object(cid, &path)?;

        let mut content = Vec::new();
        match header.compression {
            CompressionType::None => {
                reader.read_to_end(&mut content)?;
            }
            CompressionType::Zstd => {
                zstd::stream::copy_decode(reader, &mut content).map_err(|e| {
                    Error::corrupted_object(&path, format!("Decompression failed: {}", e))
                })?;
            }
        }

        if content.len() as u64 != header.content_len {
            return Err(Error::corrupted_object(
                &path,
                format!(
                    "Content length mismatch: expected {}, got {}",
                    header.content_len,
                    content.len()
                ),
            ));
        }

        // Verify hash matches content (corruption detection)
        let computed = Hash::hash_bytes(&content);
        if computed != *cid.hash() {
            return Err(Error::corrupted_object(
                &path,
                format!(
                    "Hash mismatch: expected {}, got {}",
                    cid.hash().to_hex(),
                    computed.to_hex()
                ),
            ));
        }

        Ok(content)
    }
}
