//! Concurrent writers against one index blob.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use subscription_store::{
    KvError, KvStore, MemoryKvStore, NewSubscription, StoreConfig, SubscriptionError,
    SubscriptionStore,
};

type Hook = Box<dyn FnOnce(&MemoryKvStore) + Send>;

/// Store that runs a competing write right after the first read, before
/// the reader gets to write back.
struct InterleavingStore {
    inner: MemoryKvStore,
    hook: Mutex<Option<Hook>>,
}

impl InterleavingStore {
    fn new(inner: MemoryKvStore, hook: Hook) -> Self {
        Self {
            inner,
            hook: Mutex::new(Some(hook)),
        }
    }
}

impl KvStore for InterleavingStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let value = self.inner.get(key)?;
        if let Some(hook) = self.hook.lock().take() {
            hook(&self.inner);
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.inner.set(key, value)
    }

    fn supports_compare_and_set(&self) -> bool {
        self.inner.supports_compare_and_set()
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, KvError> {
        self.inner.compare_and_set(key, expected, new)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn competing_add(target: &'static str) -> Hook {
    Box::new(move |inner: &MemoryKvStore| {
        SubscriptionStore::new(inner)
            .add_subscription(NewSubscription::new(target))
            .unwrap();
    })
}

// --- Interleaved Writers ---

#[test]
fn test_compare_and_set_keeps_both_updates() {
    init_tracing();

    let store = SubscriptionStore::new(InterleavingStore::new(
        MemoryKvStore::new(),
        competing_add("chan-b"),
    ));

    store.add_subscription(NewSubscription::new("chan-a")).unwrap();

    let index = store.load().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.ids_for_target("chan-a").len(), 1);
    assert_eq!(index.ids_for_target("chan-b").len(), 1);
    assert!(index.check_consistency().is_ok());
}

#[test]
fn test_unconditional_fallback_loses_update() {
    init_tracing();

    let store = SubscriptionStore::new(InterleavingStore::new(
        MemoryKvStore::without_compare_and_set(),
        competing_add("chan-b"),
    ));

    store.add_subscription(NewSubscription::new("chan-a")).unwrap();

    // Last writer wins; the competing add is gone
    let index = store.load().unwrap();
    assert_eq!(index.len(), 1);
    assert!(index.ids_for_target("chan-b").is_empty());
}

#[test]
fn test_conflict_with_single_attempt_fails() {
    init_tracing();

    let store = SubscriptionStore::with_config(
        InterleavingStore::new(MemoryKvStore::new(), competing_add("chan-b")),
        StoreConfig {
            max_retries: 1,
            ..Default::default()
        },
    );

    let result = store.add_subscription(NewSubscription::new("chan-a"));
    assert!(matches!(
        result,
        Err(SubscriptionError::ConcurrentModification { attempts: 1, .. })
    ));

    // Only the competing write landed
    let index = store.load().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.ids_for_target("chan-b").len(), 1);
}

#[test]
fn test_remove_retries_against_fresh_index() {
    let kv = MemoryKvStore::new();
    let id = SubscriptionStore::new(&kv)
        .add_subscription(NewSubscription::new("chan-a"))
        .unwrap();

    let store = SubscriptionStore::new(InterleavingStore::new(kv, competing_add("chan-b")));
    store.remove_subscription(&id).unwrap();

    let index = store.load().unwrap();
    assert_eq!(index.len(), 1);
    assert!(!index.contains(&id));
    assert_eq!(index.ids_for_target("chan-b").len(), 1);
}

// --- Threads ---

#[test]
fn test_parallel_adds_all_survive() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;

    let store = Arc::new(SubscriptionStore::with_config(
        Arc::new(MemoryKvStore::new()),
        StoreConfig {
            max_retries: 10_000,
            ..Default::default()
        },
    ));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        store
                            .add_subscription(
                                NewSubscription::new(format!("chan{}", t))
                                    .with_events([format!("event{}", i % 3)]),
                            )
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let index = store.load().unwrap();
    assert_eq!(index.len(), THREADS * PER_THREAD);
    for id in &ids {
        assert!(index.contains(id));
    }
    for t in 0..THREADS {
        assert_eq!(index.ids_for_target(&format!("chan{}", t)).len(), PER_THREAD);
    }
    assert!(index.check_consistency().is_ok());
}

#[test]
fn test_parallel_add_and_remove() {
    let kv = Arc::new(MemoryKvStore::new());
    let config = StoreConfig {
        max_retries: 10_000,
        ..Default::default()
    };
    let store = Arc::new(SubscriptionStore::with_config(Arc::clone(&kv), config));

    let doomed: Vec<_> = (0..20)
        .map(|_| store.add_subscription(NewSubscription::new("old")).unwrap())
        .collect();

    let remover = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for id in &doomed {
                store.remove_subscription(id).unwrap();
            }
        })
    };
    let adder = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..20 {
                store.add_subscription(NewSubscription::new("new")).unwrap();
            }
        })
    };

    remover.join().unwrap();
    adder.join().unwrap();

    let index = store.load().unwrap();
    assert!(index.ids_for_target("old").is_empty());
    assert_eq!(index.ids_for_target("new").len(), 20);
    assert!(index.check_consistency().is_ok());
}
