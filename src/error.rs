//! Error types for the subscription store.

use crate::kv::KvError;
use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for subscription operations.
///
/// Variants are split by the stage that failed so callers can tell a store
/// outage apart from a corrupt blob or a plain missing subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("unable to read initial value for key {key}: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: KvError,
    },

    #[error("problem writing value for key {key}: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: KvError,
    },

    #[error("failed to decode subscriptions: {0}")]
    Decode(String),

    #[error("failed to encode subscriptions: {0}")]
    Encode(String),

    #[error("could not find subscription: {0}")]
    NotFound(SubscriptionId),

    #[error("subscription id already in use: {0}")]
    DuplicateId(SubscriptionId),

    #[error("invalid subscription: {0}")]
    Validation(String),

    #[error("concurrent modification of key {key}: gave up after {attempts} attempts")]
    ConcurrentModification { key: String, attempts: u32 },

    #[error("not authorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl SubscriptionError {
    /// True for errors caused by the referenced subscription not existing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SubscriptionError::NotFound(_))
    }
}

impl From<rmp_serde::encode::Error> for SubscriptionError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SubscriptionError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SubscriptionError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SubscriptionError::Decode(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
