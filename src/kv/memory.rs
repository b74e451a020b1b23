//! In-memory key-value store.

use super::{KvError, KvStore};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local store backed by a locked map.
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    compare_and_set: bool,
}

impl MemoryKvStore {
    /// Create an empty store with compare-and-set support.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            compare_and_set: true,
        }
    }

    /// Create an empty store that only offers get/set, like older hosts.
    pub fn without_compare_and_set() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            compare_and_set: false,
        }
    }

    /// Get count of keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn supports_compare_and_set(&self) -> bool {
        self.compare_and_set
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        if !self.compare_and_set {
            return Err(KvError::Unavailable(
                "compare-and-set disabled for this store".into(),
            ));
        }

        let mut entries = self.entries.write();
        if entries.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), new.to_vec());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_absent() {
        let store = MemoryKvStore::new();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_set_and_get() {
        let store = MemoryKvStore::new();
        store.set("key", b"value").unwrap();
        assert_eq!(store.get("key").unwrap().unwrap(), b"value");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set() {
        let store = MemoryKvStore::new();

        // Absent key must be expected as None
        assert!(!store.compare_and_set("key", Some(b"x"), b"v1").unwrap());
        assert!(store.compare_and_set("key", None, b"v1").unwrap());
        assert!(!store.compare_and_set("key", None, b"v2").unwrap());

        assert!(!store.compare_and_set("key", Some(b"stale"), b"v2").unwrap());
        assert!(store.compare_and_set("key", Some(b"v1"), b"v2").unwrap());
        assert_eq!(store.get("key").unwrap().unwrap(), b"v2");
    }

    #[test]
    fn test_compare_and_set_disabled() {
        let store = MemoryKvStore::without_compare_and_set();
        assert!(!store.supports_compare_and_set());

        let result = store.compare_and_set("key", None, b"v1");
        assert!(matches!(result, Err(KvError::Unavailable(_))));
        assert!(store.get("key").unwrap().is_none());
    }
}
