//! Subscription index: primary store plus secondary indices.

use crate::error::{Result, SubscriptionError};
use crate::types::{Subscription, SubscriptionId};
use std::collections::HashMap;

/// In-memory view of every subscription, kept in four synchronized maps.
///
/// Each operation decodes its own copy from the persisted blob, mutates it,
/// and encodes it back. Nothing here is shared between operations, so the
/// maps carry no locks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionIndex {
    /// Authoritative store: id -> subscription.
    pub(crate) by_id: HashMap<SubscriptionId, Subscription>,

    /// Target -> ids of subscriptions delivering there.
    pub(crate) by_target: HashMap<String, Vec<SubscriptionId>>,

    /// Event kind -> ids of subscriptions that enumerate that kind.
    pub(crate) by_event_kind: HashMap<String, Vec<SubscriptionId>>,

    /// Ids of subscriptions whose `events` filter is empty or missing.
    pub(crate) any_event: Vec<SubscriptionId>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription under every index it belongs to.
    ///
    /// The id must already be assigned and not present.
    pub fn add(&mut self, subscription: Subscription) -> Result<()> {
        if self.by_id.contains_key(&subscription.id) {
            return Err(SubscriptionError::DuplicateId(subscription.id));
        }

        let id = subscription.id.clone();

        self.by_target
            .entry(subscription.target.clone())
            .or_default()
            .push(id.clone());

        if subscription.accepts_any_event() {
            self.any_event.push(id.clone());
        } else {
            for kind in unique(subscription.event_kinds()) {
                self.by_event_kind
                    .entry(kind.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        self.by_id.insert(id, subscription);
        Ok(())
    }

    /// Remove a subscription from every index, returning it.
    ///
    /// Order among the remaining ids of a secondary list is not preserved.
    pub fn remove(&mut self, id: &SubscriptionId) -> Result<Subscription> {
        let subscription = self
            .by_id
            .remove(id)
            .ok_or_else(|| SubscriptionError::NotFound(id.clone()))?;

        strip(&mut self.by_target, &subscription.target, id);

        if subscription.accepts_any_event() {
            swap_remove_id(&mut self.any_event, id);
        } else {
            for kind in unique(subscription.event_kinds()) {
                strip(&mut self.by_event_kind, kind, id);
            }
        }

        Ok(subscription)
    }

    /// Replace an existing subscription with the same id.
    pub fn replace(&mut self, subscription: Subscription) -> Result<Subscription> {
        let previous = self.remove(&subscription.id)?;
        self.add(subscription)?;
        Ok(previous)
    }

    /// Get a subscription by id.
    pub fn get(&self, id: &SubscriptionId) -> Option<&Subscription> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Ids of subscriptions delivering to a target.
    pub fn ids_for_target(&self, target: &str) -> &[SubscriptionId] {
        self.by_target.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of subscriptions enumerating an event kind.
    pub fn ids_for_event_kind(&self, kind: &str) -> &[SubscriptionId] {
        self.by_event_kind
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of subscriptions accepting any event kind.
    pub fn ids_for_any_event(&self) -> &[SubscriptionId] {
        &self.any_event
    }

    /// Subscriptions delivering to a target, in index order.
    pub fn for_target(&self, target: &str) -> Vec<Subscription> {
        self.ids_for_target(target)
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Iterate over all subscriptions (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.by_id.values()
    }

    /// Get count of subscriptions.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Rebuild the wildcard-event bucket from the primary store.
    pub(crate) fn rebuild_any_event(&mut self) {
        let mut ids: Vec<SubscriptionId> = self
            .by_id
            .values()
            .filter(|sub| sub.accepts_any_event())
            .map(|sub| sub.id.clone())
            .collect();
        ids.sort();
        self.any_event = ids;
    }

    /// Check every cross-index invariant, describing the first violation.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for (target, ids) in &self.by_target {
            for id in ids {
                let sub = self
                    .by_id
                    .get(id)
                    .ok_or_else(|| format!("target {} references missing id {}", target, id))?;
                if &sub.target != target {
                    return Err(format!("id {} indexed under wrong target {}", id, target));
                }
            }
        }

        for (kind, ids) in &self.by_event_kind {
            for id in ids {
                let sub = self
                    .by_id
                    .get(id)
                    .ok_or_else(|| format!("event {} references missing id {}", kind, id))?;
                if !sub.event_kinds().contains(kind) {
                    return Err(format!("id {} indexed under unlisted event {}", id, kind));
                }
            }
        }

        for id in &self.any_event {
            let sub = self
                .by_id
                .get(id)
                .ok_or_else(|| format!("wildcard bucket references missing id {}", id))?;
            if !sub.accepts_any_event() {
                return Err(format!("id {} in wildcard bucket lists events", id));
            }
        }

        for (key, sub) in &self.by_id {
            if key != &sub.id {
                return Err(format!("id {} stored under key {}", sub.id, key));
            }

            let in_target = count(self.ids_for_target(&sub.target), &sub.id);
            if in_target != 1 {
                return Err(format!("id {} appears {} times under its target", sub.id, in_target));
            }

            if sub.accepts_any_event() {
                let n = count(&self.any_event, &sub.id);
                if n != 1 {
                    return Err(format!("id {} appears {} times in wildcard bucket", sub.id, n));
                }
            } else {
                for kind in sub.event_kinds() {
                    let n = count(self.ids_for_event_kind(kind), &sub.id);
                    if n != 1 {
                        return Err(format!("id {} appears {} times under event {}", sub.id, n, kind));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Event kinds with duplicates dropped, first occurrence wins.
fn unique(kinds: &[String]) -> impl Iterator<Item = &String> {
    kinds
        .iter()
        .enumerate()
        .filter(move |(i, kind)| !kinds[..*i].contains(*kind))
        .map(|(_, kind)| kind)
}

fn count(ids: &[SubscriptionId], id: &SubscriptionId) -> usize {
    ids.iter().filter(|other| *other == id).count()
}

/// Swap the id with the last element and truncate.
fn swap_remove_id(ids: &mut Vec<SubscriptionId>, id: &SubscriptionId) {
    if let Some(pos) = ids.iter().position(|other| other == id) {
        ids.swap_remove(pos);
    }
}

/// Remove an id from a keyed list, dropping the key once the list is empty.
fn strip(map: &mut HashMap<String, Vec<SubscriptionId>>, key: &str, id: &SubscriptionId) {
    if let Some(ids) = map.get_mut(key) {
        swap_remove_id(ids, id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}
