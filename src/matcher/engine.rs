//! Deciding which subscriptions accept an event.

use super::event::{Event, FieldRegistry};
use crate::index::SubscriptionIndex;
use crate::types::{Subscription, SubscriptionId};
use serde::{Deserialize, Serialize};

/// How subscriptions with an empty `events` filter are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardEvents {
    /// They are candidates for every event kind.
    #[default]
    MatchAll,
    /// They never match. Earlier deployments behaved this way.
    Ignore,
}

/// Matcher configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default)]
    pub wildcard_events: WildcardEvents,
}

/// Computes the subscriptions, and so the targets, an event is delivered to.
#[derive(Debug)]
pub struct EventMatcher<E> {
    fields: FieldRegistry<E>,
    config: MatcherConfig,
}

impl<E: Event> EventMatcher<E> {
    pub fn new(fields: FieldRegistry<E>, config: MatcherConfig) -> Self {
        Self { fields, config }
    }

    /// Matcher with the default configuration.
    pub fn with_fields(fields: FieldRegistry<E>) -> Self {
        Self::new(fields, MatcherConfig::default())
    }

    pub fn fields(&self) -> &FieldRegistry<E> {
        &self.fields
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Check whether a subscription's filters accept an event.
    ///
    /// Every known field with a non-empty value list must contain the
    /// event's value. Empty lists and unknown fields always pass.
    pub fn accepts(&self, subscription: &Subscription, event: &E) -> bool {
        for (field, acceptable) in &subscription.filters {
            // Blank in acceptable values means all values are acceptable
            if acceptable.is_empty() {
                continue;
            }

            let value = match self.fields.resolve(event, field) {
                Some(value) => value,
                None => continue,
            };

            let found = match value {
                Some(value) => acceptable.iter().any(|candidate| candidate == value),
                None => false,
            };
            if !found {
                return false;
            }
        }

        true
    }

    /// Subscriptions accepting the event, in candidate order.
    ///
    /// Candidates are the ids indexed under the event kind, followed by the
    /// wildcard-event bucket when [`WildcardEvents::MatchAll`] is set.
    pub fn matching<'a>(&self, index: &'a SubscriptionIndex, event: &E) -> Vec<&'a Subscription> {
        let by_kind = index.ids_for_event_kind(event.kind());
        let wildcard: &[SubscriptionId] = match self.config.wildcard_events {
            WildcardEvents::MatchAll => index.ids_for_any_event(),
            WildcardEvents::Ignore => &[],
        };

        by_kind
            .iter()
            .chain(wildcard)
            .filter_map(|id| index.get(id))
            .filter(|sub| self.accepts(sub, event))
            .collect()
    }

    /// Targets of every subscription accepting the event.
    pub fn match_targets(&self, index: &SubscriptionIndex, event: &E) -> Vec<String> {
        self.matching(index, event)
            .into_iter()
            .map(|sub| sub.target.clone())
            .collect()
    }
}
