//! # Subscription Store
//!
//! Channel subscriptions to an external event stream, persisted as one
//! opaque blob in a key-value store, and the matching that decides which
//! channels an incoming event is delivered to.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: a target channel plus per-field acceptance filters
//! - **Index**: the primary store plus secondary indices by target and by
//!   event kind, encoded as a single blob
//! - **Atomic modify**: every mutation is a read-transform-write cycle,
//!   guarded by compare-and-set when the store offers it
//! - **Matching**: candidates from the event-kind index, filtered field by
//!   field
//!
//! ## Example
//!
//! ```ignore
//! use subscription_store::{
//!     EventMatcher, MemoryKvStore, NewSubscription, SubscriptionStore, WebhookEvent,
//! };
//!
//! let store = SubscriptionStore::new(MemoryKvStore::new());
//!
//! // Subscribe a channel to created issues in project ABC
//! let id = store.add_subscription(
//!     NewSubscription::new("chan1")
//!         .with_events(["jira:issue_created"])
//!         .with_filter("project", ["ABC"]),
//! )?;
//!
//! // Find the channels an event goes to
//! let matcher = EventMatcher::with_fields(WebhookEvent::field_registry());
//! let event = WebhookEvent::new("jira:issue_created").with_field("project", "ABC");
//! let channels = store.match_subscriptions(&matcher, &event)?;
//! ```

pub mod api;
pub mod atomic;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod kv;
pub mod matcher;
pub mod store;
pub mod types;

// Re-exports
pub use api::{Membership, SubscriptionApi};
pub use atomic::{atomic_modify, ModifyStats};
pub use dispatch::{
    dispatch, ChannelSink, Delivery, DeliveryError, DeliveryReceiver, DeliverySink, DispatchReport,
};
pub use error::{Result, SubscriptionError};
pub use index::{Codec, SubscriptionIndex};
pub use kv::{FileKvStore, KvError, KvStore, MemoryKvStore};
pub use matcher::{Event, EventMatcher, FieldRegistry, MatcherConfig, WebhookEvent, WildcardEvents};
pub use store::{StoreConfig, SubscriptionStore, DEFAULT_SUBSCRIPTIONS_KEY};
pub use types::*;
