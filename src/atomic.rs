//! Read-modify-write against a key-value store.
//!
//! Every mutation of the persisted index goes through [`atomic_modify`].
//! One call reads the current bytes, hands them to a transform, and writes
//! the result back. With compare-and-set the write only lands if nobody
//! wrote in between; otherwise the whole cycle is retried on a fresh read.
//! Stores without compare-and-set get an unconditional overwrite, which can
//! lose a concurrent writer's update.

use crate::error::{Result, SubscriptionError};
use crate::kv::KvStore;
use tracing::{debug, warn};

/// Outcome of a successful [`atomic_modify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModifyStats {
    /// Read-transform-write cycles run, including the successful one.
    pub attempts: u32,
    /// Whether the write was guarded by compare-and-set.
    pub conditional: bool,
}

/// Apply `transform` to the value at `key` and store the result.
///
/// `transform` receives the current bytes (empty when the key is absent)
/// and may run more than once, always on freshly read bytes. A transform
/// error aborts the call before anything is written. With compare-and-set
/// the cycle is tried at most `max_retries` times (at least once) before
/// failing with [`SubscriptionError::ConcurrentModification`].
pub fn atomic_modify<S, F>(
    store: &S,
    key: &str,
    max_retries: u32,
    mut transform: F,
) -> Result<ModifyStats>
where
    S: KvStore + ?Sized,
    F: FnMut(&[u8]) -> Result<Vec<u8>>,
{
    let conditional = store.supports_compare_and_set();
    let max_attempts = max_retries.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        let initial = store
            .get(key)
            .map_err(|source| SubscriptionError::StoreRead {
                key: key.to_string(),
                source,
            })?;

        let modified = transform(initial.as_deref().unwrap_or(&[]))?;

        if !conditional {
            warn!(key, "store lacks compare-and-set; overwriting unconditionally");
            store
                .set(key, &modified)
                .map_err(|source| SubscriptionError::StoreWrite {
                    key: key.to_string(),
                    source,
                })?;
            return Ok(ModifyStats {
                attempts,
                conditional,
            });
        }

        let written = store
            .compare_and_set(key, initial.as_deref(), &modified)
            .map_err(|source| SubscriptionError::StoreWrite {
                key: key.to_string(),
                source,
            })?;

        if written {
            debug!(key, attempts, "atomic modify committed");
            return Ok(ModifyStats {
                attempts,
                conditional,
            });
        }

        if attempts >= max_attempts {
            warn!(key, attempts, "atomic modify gave up after repeated conflicts");
            return Err(SubscriptionError::ConcurrentModification {
                key: key.to_string(),
                attempts,
            });
        }

        debug!(key, attempts, "value changed underneath; retrying on fresh read");
    }
}
