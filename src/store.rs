//! Main SubscriptionStore tying the index, codec and key-value store together.

use crate::atomic::atomic_modify;
use crate::error::{Result, SubscriptionError};
use crate::index::{Codec, SubscriptionIndex};
use crate::kv::KvStore;
use crate::matcher::{Event, EventMatcher};
use crate::types::{NewSubscription, Subscription, SubscriptionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Key the index blob is stored under by default.
pub const DEFAULT_SUBSCRIPTIONS_KEY: &str = "jirasub";

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key holding the serialized index.
    pub key: String,

    /// Byte format of the stored index.
    pub codec: Codec,

    /// Maximum read-modify-write cycles per mutation when the store
    /// supports compare-and-set.
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_SUBSCRIPTIONS_KEY.to_string(),
            codec: Codec::Json,
            max_retries: 16,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SubscriptionError::Validation(e.to_string()))
    }
}

/// Subscription persistence and queries over a key-value store.
///
/// Every call reads and decodes the index afresh; every mutation goes
/// through [`atomic_modify`]. The store itself holds no index state.
pub struct SubscriptionStore<S> {
    kv: S,
    config: StoreConfig,
}

impl<S: KvStore> SubscriptionStore<S> {
    /// Create a store with the default configuration.
    pub fn new(kv: S) -> Self {
        Self::with_config(kv, StoreConfig::default())
    }

    pub fn with_config(kv: S, config: StoreConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Load a private snapshot of the index.
    pub fn load(&self) -> Result<SubscriptionIndex> {
        let bytes = self
            .kv
            .get(&self.config.key)
            .map_err(|source| SubscriptionError::StoreRead {
                key: self.config.key.clone(),
                source,
            })?;

        self.config.codec.decode(bytes.as_deref().unwrap_or(&[]))
    }

    /// Decode, mutate and re-encode the index in one atomic cycle.
    fn modify<T, F>(&self, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut SubscriptionIndex) -> Result<T>,
    {
        let codec = self.config.codec;
        let mut output = None;

        atomic_modify(&self.kv, &self.config.key, self.config.max_retries, |initial| {
            let mut index = codec.decode(initial)?;
            let value = mutate(&mut index)?;
            let bytes = codec.encode(&index)?;
            output = Some(value);
            Ok(bytes)
        })?;

        output.ok_or_else(|| {
            SubscriptionError::Encode("modification finished without a result".into())
        })
    }

    // --- Queries ---

    /// Subscriptions delivering to a target, in index order.
    pub fn list_subscriptions(&self, target: &str) -> Result<Vec<Subscription>> {
        Ok(self.load()?.for_target(target))
    }

    /// Get a subscription by id.
    pub fn get_subscription(&self, id: &SubscriptionId) -> Result<Subscription> {
        self.load()?
            .get(id)
            .cloned()
            .ok_or_else(|| SubscriptionError::NotFound(id.clone()))
    }

    /// Targets whose subscriptions accept the event.
    pub fn match_subscriptions<E: Event>(
        &self,
        matcher: &EventMatcher<E>,
        event: &E,
    ) -> Result<Vec<String>> {
        let index = self.load()?;
        let targets = matcher.match_targets(&index, event);
        debug!(kind = event.kind(), matched = targets.len(), "matched event");
        Ok(targets)
    }

    // --- Lifecycle ---

    /// Persist a new subscription, returning its assigned id.
    pub fn add_subscription(&self, subscription: NewSubscription) -> Result<SubscriptionId> {
        validate_target(&subscription.target)?;

        let id = self.modify(|index| {
            let mut id = SubscriptionId::generate();
            while index.contains(&id) {
                id = SubscriptionId::generate();
            }
            index.add(subscription.clone().with_id(id.clone()))?;
            Ok(id)
        })?;

        info!(id = %id, channel = %subscription.target, "added subscription");
        Ok(id)
    }

    /// Replace an existing subscription wholesale.
    pub fn edit_subscription(&self, subscription: Subscription) -> Result<()> {
        validate_target(&subscription.target)?;
        if subscription.id.as_str().is_empty() {
            return Err(SubscriptionError::Validation("subscription id is required".into()));
        }

        let previous = self.modify(|index| index.replace(subscription.clone()))?;

        info!(
            id = %subscription.id,
            from = %previous.target,
            to = %subscription.target,
            "edited subscription"
        );
        Ok(())
    }

    /// Delete a subscription, returning what was removed.
    pub fn remove_subscription(&self, id: &SubscriptionId) -> Result<Subscription> {
        let removed = self.modify(|index| index.remove(id))?;
        info!(id = %id, channel = %removed.target, "removed subscription");
        Ok(removed)
    }
}

fn validate_target(target: &str) -> Result<()> {
    if target.trim().is_empty() {
        return Err(SubscriptionError::Validation("target is required".into()));
    }
    Ok(())
}
