//! Key-value storage collaborator.
//!
//! The subscription store persists its whole index as one blob under one
//! key. Any backend offering get/set by key works; backends that can also
//! compare-and-set let concurrent writers update the blob without losing
//! each other's changes.

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Simple get/set storage keyed by string.
pub trait KvStore: Send + Sync {
    /// Read the value at `key`. Absent keys yield `None`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Write `value` at `key` unconditionally.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// Whether [`KvStore::compare_and_set`] is implemented.
    fn supports_compare_and_set(&self) -> bool {
        false
    }

    /// Write `new` only if the current value equals `expected`.
    ///
    /// `expected = None` requires the key to be absent. Returns `false` when
    /// the current value differs. Backends without support report
    /// `Unavailable`.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        let _ = (key, expected, new);
        Err(KvError::Unavailable(
            "compare-and-set not supported by this store".into(),
        ))
    }
}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        (**self).set(key, value)
    }

    fn supports_compare_and_set(&self) -> bool {
        (**self).supports_compare_and_set()
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        (**self).compare_and_set(key, expected, new)
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        (**self).set(key, value)
    }

    fn supports_compare_and_set(&self) -> bool {
        (**self).supports_compare_and_set()
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        (**self).compare_and_set(key, expected, new)
    }
}
