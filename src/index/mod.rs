//! Subscription index and its persisted encoding.

pub mod codec;
mod subscriptions;

pub use codec::{decode, encode, Codec};
pub use subscriptions::SubscriptionIndex;
