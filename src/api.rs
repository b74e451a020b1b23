//! Caller-facing subscription management.
//!
//! Wraps a [`SubscriptionStore`] with the checks the request layer applies
//! before touching the store: a caller identity must be present, ids and
//! targets must have the fixed identifier length, and the caller must be a
//! member of every target the request touches.

use crate::error::{Result, SubscriptionError};
use crate::kv::KvStore;
use crate::store::SubscriptionStore;
use crate::types::{NewSubscription, Subscription, SubscriptionId, ID_LENGTH};
use tracing::warn;

/// Answers whether a user may manage subscriptions for a target.
pub trait Membership: Send + Sync {
    fn is_member(&self, target: &str, user_id: &str) -> bool;
}

impl<F> Membership for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_member(&self, target: &str, user_id: &str) -> bool {
        self(target, user_id)
    }
}

/// Subscription management on behalf of an identified caller.
pub struct SubscriptionApi<S, M> {
    store: SubscriptionStore<S>,
    membership: M,
}

impl<S: KvStore, M: Membership> SubscriptionApi<S, M> {
    pub fn new(store: SubscriptionStore<S>, membership: M) -> Self {
        Self { store, membership }
    }

    pub fn store(&self) -> &SubscriptionStore<S> {
        &self.store
    }

    /// Create a subscription. The caller supplies no id.
    pub fn create(&self, user_id: &str, subscription: NewSubscription) -> Result<SubscriptionId> {
        check_user(user_id)?;
        if subscription.target.len() != ID_LENGTH {
            return Err(SubscriptionError::Validation(
                "channel subscription invalid".into(),
            ));
        }
        self.check_member(&subscription.target, user_id)?;

        self.store.add_subscription(subscription)
    }

    /// Replace a subscription. The caller must belong to both the current
    /// and the new target.
    pub fn edit(&self, user_id: &str, subscription: Subscription) -> Result<()> {
        check_user(user_id)?;
        if subscription.target.len() != ID_LENGTH || subscription.id.as_str().len() != ID_LENGTH {
            return Err(SubscriptionError::Validation(
                "channel subscription invalid".into(),
            ));
        }
        self.check_member(&subscription.target, user_id)?;

        let current = self.store.get_subscription(&subscription.id)?;
        if current.target != subscription.target {
            self.check_member(&current.target, user_id)?;
        }

        self.store.edit_subscription(subscription)
    }

    /// Delete a subscription owned by a target the caller belongs to.
    pub fn delete(&self, user_id: &str, id: &SubscriptionId) -> Result<Subscription> {
        check_user(user_id)?;
        check_id(id.as_str(), "bad subscription id")?;

        let current = self.store.get_subscription(id)?;
        self.check_member(&current.target, user_id)?;

        self.store.remove_subscription(id)
    }

    /// Fetch one subscription whose target the caller belongs to.
    pub fn get(&self, user_id: &str, id: &SubscriptionId) -> Result<Subscription> {
        check_user(user_id)?;
        check_id(id.as_str(), "bad subscription id")?;

        let subscription = self.store.get_subscription(id)?;
        self.check_member(&subscription.target, user_id)?;
        Ok(subscription)
    }

    /// List the subscriptions of a target the caller belongs to.
    pub fn list(&self, user_id: &str, target: &str) -> Result<Vec<Subscription>> {
        check_user(user_id)?;
        check_id(target, "bad channel id")?;
        self.check_member(target, user_id)?;

        self.store.list_subscriptions(target)
    }

    fn check_member(&self, target: &str, user_id: &str) -> Result<()> {
        if self.membership.is_member(target, user_id) {
            return Ok(());
        }
        warn!(channel = target, user = user_id, "caller is not a member of the target");
        Err(SubscriptionError::Forbidden(
            "not a member of the channel specified".into(),
        ))
    }
}

fn check_user(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(SubscriptionError::Unauthorized);
    }
    Ok(())
}

fn check_id(id: &str, message: &str) -> Result<()> {
    if id.len() != ID_LENGTH {
        return Err(SubscriptionError::Validation(message.to_string()));
    }
    Ok(())
}
