//! File-backed key-value store.
//!
//! One file per key, named by the SHA-256 of the key and sharded into
//! directories by the first byte of the hash.

use super::{KvError, KvStore};
use fs2::FileExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for value files.
const VALUE_MAGIC: &[u8; 4] = b"KVS\0";

/// Current value file format version.
const VALUE_VERSION: u8 = 1;

/// Values larger than this are treated as corrupt.
const MAX_VALUE_LEN: u64 = 256 * 1024 * 1024;

/// Durable store writing each key to its own checksummed file.
///
/// Writes go to a temporary file that is renamed over the old one, so a
/// reader sees either the old or the new value. `set` and
/// `compare_and_set` hold an advisory lock on `LOCK` so writers in other
/// processes sharing the directory are serialized too.
pub struct FileKvStore {
    /// Base directory.
    path: PathBuf,

    /// Advisory lock file shared by all writers.
    lock_file: File,

    /// In-process writer lock; advisory file locks do not exclude threads.
    write_lock: Mutex<()>,
}

impl FileKvStore {
    /// Open or create a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.join("LOCK"))?;

        Ok(Self {
            path,
            lock_file,
            write_lock: Mutex::new(()),
        })
    }

    /// Base directory of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` while holding both the thread and the process lock.
    fn with_write_lock<T>(
        &self,
        f: impl FnOnce() -> Result<T, KvError>,
    ) -> Result<T, KvError> {
        let _guard = self.write_lock.lock();
        self.lock_file.lock_exclusive()?;
        let result = f();
        let unlocked = FileExt::unlock(&self.lock_file);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn read_value(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let value_path = self.value_path(key);
        let mut file = match File::open(&value_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Read and verify magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != VALUE_MAGIC {
            return Err(KvError::Corruption("invalid value file magic".into()));
        }

        // Read version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != VALUE_VERSION {
            return Err(KvError::Corruption(format!(
                "unsupported value file version: {}",
                version[0]
            )));
        }

        // Read key
        let mut key_len_bytes = [0u8; 2];
        file.read_exact(&mut key_len_bytes)?;
        let key_len = u16::from_le_bytes(key_len_bytes) as usize;

        let mut stored_key = vec![0u8; key_len];
        file.read_exact(&mut stored_key)?;
        if stored_key != key.as_bytes() {
            return Err(KvError::Corruption(format!(
                "value file for {} holds key {}",
                key,
                String::from_utf8_lossy(&stored_key)
            )));
        }

        // Read value
        let mut value_len_bytes = [0u8; 8];
        file.read_exact(&mut value_len_bytes)?;
        let value_len = u64::from_le_bytes(value_len_bytes);
        if value_len > MAX_VALUE_LEN {
            return Err(KvError::Corruption(format!(
                "value length {} exceeds limit",
                value_len
            )));
        }

        let mut value = vec![0u8; value_len as usize];
        file.read_exact(&mut value)?;

        // Read and verify checksum
        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&value);

        if stored_checksum != computed_checksum {
            return Err(KvError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(Some(value))
    }

    fn write_value(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let key_bytes = key.as_bytes();
        let key_len = u16::try_from(key_bytes.len())
            .map_err(|_| KvError::Unavailable(format!("key too long: {} bytes", key_bytes.len())))?;

        let value_path = self.value_path(key);
        if let Some(shard_dir) = value_path.parent() {
            fs::create_dir_all(shard_dir)?;
        }

        let tmp_path = value_path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;

        // Write header
        file.write_all(VALUE_MAGIC)?;
        file.write_all(&[VALUE_VERSION])?;

        // Write key
        file.write_all(&key_len.to_le_bytes())?;
        file.write_all(key_bytes)?;

        // Write value
        file.write_all(&(value.len() as u64).to_le_bytes())?;
        file.write_all(value)?;

        // Write checksum
        file.write_all(&crc32fast::hash(value).to_le_bytes())?;

        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &value_path)?;
        Ok(())
    }

    /// Get the full path for a key's value file.
    fn value_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.path
            .join(hex::encode(&digest[0..1]))
            .join(format!("{}.kv", hex::encode(digest)))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.read_value(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.with_write_lock(|| self.write_value(key, value))
    }

    fn supports_compare_and_set(&self) -> bool {
        true
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        self.with_write_lock(|| {
            let current = self.read_value(key)?;
            if current.as_deref() != expected {
                return Ok(false);
            }
            self.write_value(key, new)?;
            Ok(true)
        })
    }
}
