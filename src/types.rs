//! Core types for the subscription store.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Filter field holding the accepted event kinds.
pub const EVENTS_FIELD: &str = "events";

/// Filter field matched against the event kind, like `events` but never
/// indexed.
pub const EVENT_FIELD: &str = "event";

/// Filter field holding accepted project keys.
pub const PROJECT_FIELD: &str = "project";

/// Filter field holding accepted issue type ids.
pub const ISSUE_TYPE_FIELD: &str = "issue_type";

/// Length of every identifier handed out by [`SubscriptionId::generate`].
pub const ID_LENGTH: usize = 26;

/// Base32 alphabet used for generated ids.
const ID_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// Per-field acceptance filters: field name to acceptable values.
///
/// An empty value list, or a missing field, accepts any value.
pub type Filters = HashMap<String, Vec<String>>;

/// Read filters written as `null`, or holding `null` value lists, as empty.
fn nullable_filters<'de, D>(deserializer: D) -> Result<Filters, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<Vec<String>>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(field, values)| (field, values.unwrap_or_default()))
        .collect())
}

/// Opaque unique identifier for a subscription.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Generate a fresh 26-character id from a random UUID.
    pub fn generate() -> Self {
        SubscriptionId(encode_base32(Uuid::new_v4().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        SubscriptionId(s.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        SubscriptionId(s)
    }
}

/// Unpadded base32 over 16 bytes yields exactly 26 characters.
fn encode_base32(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(ID_LENGTH);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ID_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ID_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

/// A persisted rule binding a delivery target to per-field filters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Assigned by the store on creation, never reused.
    pub id: SubscriptionId,

    /// Delivery destination (a channel id).
    #[serde(rename = "channel_id")]
    pub target: String,

    #[serde(default, deserialize_with = "nullable_filters")]
    pub filters: Filters,
}

impl Subscription {
    /// Event kinds this subscription enumerates. Empty means any kind.
    pub fn event_kinds(&self) -> &[String] {
        self.filters
            .get(EVENTS_FIELD)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the `events` filter is a wildcard.
    pub fn accepts_any_event(&self) -> bool {
        self.event_kinds().is_empty()
    }
}

/// Input for creating a subscription (before an id is assigned).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    #[serde(rename = "channel_id")]
    pub target: String,

    #[serde(default, deserialize_with = "nullable_filters")]
    pub filters: Filters,
}

impl NewSubscription {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            filters: Filters::new(),
        }
    }

    /// Add a filter field with its acceptable values.
    pub fn with_filter<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.filters
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given event kinds.
    pub fn with_events<I, V>(self, events: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.with_filter(EVENTS_FIELD, events)
    }

    /// Attach an id, producing a full subscription.
    pub fn with_id(self, id: SubscriptionId) -> Subscription {
        Subscription {
            id,
            target: self.target,
            filters: self.filters,
        }
    }
}
