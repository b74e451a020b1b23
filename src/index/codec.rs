//! Blob encoding for the subscription index.
//!
//! The JSON layout matches the blob written by earlier deployments:
//!
//! ```json
//! {"Channel": {"by_id": {...}, "id_by_channel_id": {...}, "id_by_event": {...}}}
//! ```
//!
//! `id_any_event` is written alongside. Blobs without it are upgraded on
//! decode by deriving the bucket from `by_id`.

use super::SubscriptionIndex;
use crate::error::{Result, SubscriptionError};
use crate::types::{Subscription, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Byte format of the persisted index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// JSON, readable by older deployments.
    #[default]
    Json,
    /// MessagePack with named fields.
    MessagePack,
}

#[derive(Serialize)]
struct EncodeEnvelope<'a> {
    #[serde(rename = "Channel")]
    channel: EncodeIndex<'a>,
}

#[derive(Serialize)]
struct EncodeIndex<'a> {
    by_id: &'a HashMap<SubscriptionId, Subscription>,
    #[serde(rename = "id_by_channel_id")]
    by_target: &'a HashMap<String, Vec<SubscriptionId>>,
    #[serde(rename = "id_by_event")]
    by_event_kind: &'a HashMap<String, Vec<SubscriptionId>>,
    #[serde(rename = "id_any_event")]
    any_event: &'a [SubscriptionId],
}

#[derive(Deserialize)]
struct DecodeEnvelope {
    #[serde(rename = "Channel", default)]
    channel: DecodeIndex,
}

#[derive(Default, Deserialize)]
struct DecodeIndex {
    #[serde(default)]
    by_id: HashMap<SubscriptionId, Subscription>,
    #[serde(rename = "id_by_channel_id", default)]
    by_target: HashMap<String, Vec<SubscriptionId>>,
    #[serde(rename = "id_by_event", default)]
    by_event_kind: HashMap<String, Vec<SubscriptionId>>,
    #[serde(rename = "id_any_event", default)]
    any_event: Option<Vec<SubscriptionId>>,
}

impl From<DecodeIndex> for SubscriptionIndex {
    fn from(mut raw: DecodeIndex) -> Self {
        // Older writers left empty lists behind after removals, and listed an
        // id once per repeated event kind.
        for ids in raw.by_target.values_mut().chain(raw.by_event_kind.values_mut()) {
            dedup_ids(ids);
        }
        raw.by_target.retain(|_, ids| !ids.is_empty());
        raw.by_event_kind.retain(|_, ids| !ids.is_empty());

        let upgrade = raw.any_event.is_none();
        let mut index = SubscriptionIndex {
            by_id: raw.by_id,
            by_target: raw.by_target,
            by_event_kind: raw.by_event_kind,
            any_event: raw.any_event.unwrap_or_default(),
        };
        if upgrade {
            index.rebuild_any_event();
        }
        index
    }
}

/// Drop repeated ids, keeping the first occurrence.
fn dedup_ids(ids: &mut Vec<SubscriptionId>) {
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

impl Codec {
    /// Decode a persisted blob. Empty bytes mean no subscriptions yet.
    ///
    /// A blob whose indices disagree with its primary store is rejected as
    /// a decode failure; it is never repaired here.
    pub fn decode(self, bytes: &[u8]) -> Result<SubscriptionIndex> {
        if bytes.is_empty() {
            return Ok(SubscriptionIndex::new());
        }

        let envelope: DecodeEnvelope = match self {
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| SubscriptionError::Decode(e.to_string()))?,
            Codec::MessagePack => rmp_serde::from_slice(bytes)?,
        };

        let index: SubscriptionIndex = envelope.channel.into();
        index
            .check_consistency()
            .map_err(|e| SubscriptionError::Decode(format!("inconsistent index: {}", e)))?;
        Ok(index)
    }

    /// Encode an index into bytes that [`Codec::decode`] inverts.
    pub fn encode(self, index: &SubscriptionIndex) -> Result<Vec<u8>> {
        let envelope = EncodeEnvelope {
            channel: EncodeIndex {
                by_id: &index.by_id,
                by_target: &index.by_target,
                by_event_kind: &index.by_event_kind,
                any_event: &index.any_event,
            },
        };

        match self {
            Codec::Json => serde_json::to_vec(&envelope)
                .map_err(|e| SubscriptionError::Encode(e.to_string())),
            Codec::MessagePack => Ok(rmp_serde::to_vec_named(&envelope)?),
        }
    }
}

/// Decode with the default codec.
pub fn decode(bytes: &[u8]) -> Result<SubscriptionIndex> {
    Codec::default().decode(bytes)
}

/// Encode with the default codec.
pub fn encode(index: &SubscriptionIndex) -> Result<Vec<u8>> {
    Codec::default().encode(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewSubscription;

    fn sample_index() -> SubscriptionIndex {
        let mut index = SubscriptionIndex::new();
        index
            .add(
                NewSubscription::new("chan1")
                    .with_events(["jira:issue_created"])
                    .with_filter("project", ["ABC"])
                    .with_id("s1".into()),
            )
            .unwrap();
        index
            .add(NewSubscription::new("chan2").with_id("s2".into()))
            .unwrap();
        index
    }

    #[test]
    fn test_empty_bytes_bootstrap() {
        for codec in [Codec::Json, Codec::MessagePack] {
            let mut index = codec.decode(&[]).unwrap();
            assert!(index.is_empty());
            assert!(index.by_target.is_empty());
            assert!(index.by_event_kind.is_empty());

            index
                .add(NewSubscription::new("chan1").with_id("s1".into()))
                .unwrap();
            assert_eq!(index.len(), 1);
        }
    }

    #[test]
    fn test_round_trip() {
        for codec in [Codec::Json, Codec::MessagePack] {
            let index = sample_index();
            let bytes = codec.encode(&index).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), index);

            let empty = SubscriptionIndex::new();
            let bytes = codec.encode(&empty).unwrap();
            assert!(!bytes.is_empty());
            assert_eq!(codec.decode(&bytes).unwrap(), empty);
        }
    }

    #[test]
    fn test_malformed_is_decode_error() {
        let result = Codec::Json.decode(b"{\"Channel\": {\"by_id\": 12}");
        assert!(matches!(result, Err(SubscriptionError::Decode(_))));

        let result = Codec::Json.decode(b"not json");
        assert!(matches!(result, Err(SubscriptionError::Decode(_))));

        let result = Codec::MessagePack.decode(&[0xc1, 0x00, 0xff]);
        assert!(matches!(result, Err(SubscriptionError::Decode(_))));
    }

    #[test]
    fn test_wire_layout() {
        let bytes = encode(&sample_index()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let channel = &value["Channel"];
        assert_eq!(channel["by_id"]["s1"]["channel_id"], "chan1");
        assert_eq!(channel["id_by_channel_id"]["chan1"][0], "s1");
        assert_eq!(channel["id_by_event"]["jira:issue_created"][0], "s1");
        assert_eq!(channel["id_any_event"][0], "s2");
    }

    #[test]
    fn test_legacy_blob_upgrade() {
        // Written before the wildcard bucket existed, with a stale empty list.
        let legacy = br#"{"Channel":{
            "by_id":{
                "s1":{"id":"s1","channel_id":"chan1","filters":{"events":["jira:issue_created"]}},
                "s2":{"id":"s2","channel_id":"chan2","filters":{"events":[]}}
            },
            "id_by_channel_id":{"chan1":["s1"],"chan2":["s2"],"chan3":[]},
            "id_by_event":{"jira:issue_created":["s1"]}
        }}"#;

        let index = decode(legacy).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.ids_for_any_event(), [SubscriptionId::from("s2")]);
        assert!(!index.by_target.contains_key("chan3"));
        assert!(index.check_consistency().is_ok());
    }

    #[test]
    fn test_legacy_null_filters() {
        // Subscriptions created without filters were written with nulls.
        let legacy = br#"{"Channel":{
            "by_id":{
                "s1":{"id":"s1","channel_id":"chan1","filters":null},
                "s2":{"id":"s2","channel_id":"chan2","filters":{"events":null,"project":["ABC"]}},
                "s3":{"id":"s3","channel_id":"chan2","filters":{"events":["jira:issue_created","jira:issue_created"]}}
            },
            "id_by_channel_id":{"chan1":["s1"],"chan2":["s2","s3"]},
            "id_by_event":{"jira:issue_created":["s3","s3"]}
        }}"#;

        let index = decode(legacy).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.get(&"s1".into()).unwrap().filters.is_empty());
        assert_eq!(
            index.ids_for_any_event(),
            [SubscriptionId::from("s1"), SubscriptionId::from("s2")]
        );
        assert_eq!(
            index.ids_for_event_kind("jira:issue_created"),
            [SubscriptionId::from("s3")]
        );
        assert!(index.check_consistency().is_ok());
    }

    #[test]
    fn test_inconsistent_blob_is_decode_error() {
        let blobs: [&[u8]; 3] = [
            // Primary key differs from the record's id
            br#"{"Channel":{"by_id":{"s1":{"id":"s9","channel_id":"chan1"}},
                "id_by_channel_id":{"chan1":["s9"]},"id_by_event":{}}}"#,
            // Secondary index names an id with no record
            br#"{"Channel":{"by_id":{"s1":{"id":"s1","channel_id":"chan1"}},
                "id_by_channel_id":{"chan1":["s1","ghost"]},"id_by_event":{}}}"#,
            // Record missing from its target's list
            br#"{"Channel":{"by_id":{"s1":{"id":"s1","channel_id":"chan1","filters":{"events":["created"]}}},
                "id_by_channel_id":{},"id_by_event":{"created":["s1"]}}}"#,
        ];

        for blob in blobs {
            let result = decode(blob);
            assert!(
                matches!(result, Err(SubscriptionError::Decode(ref msg)) if msg.contains("inconsistent")),
                "expected inconsistency, got {:?}",
                result
            );
        }
    }

    #[test]
    fn test_missing_filters_decode_as_empty() {
        let blob = br#"{"Channel":{"by_id":{"s1":{"id":"s1","channel_id":"chan1"}},
            "id_by_channel_id":{"chan1":["s1"]},"id_by_event":{}}}"#;
        let index = decode(blob).unwrap();
        assert!(index.get(&"s1".into()).unwrap().filters.is_empty());
        assert_eq!(index.ids_for_any_event().len(), 1);
    }
}
