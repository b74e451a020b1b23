//! Fan-out of a matched event to its delivery targets.
//!
//! Rendering and posting are left to the host; this module only hands each
//! matched target and the prepared payload to a [`DeliverySink`].

use crate::error::Result;
use crate::kv::KvStore;
use crate::matcher::{Event, EventMatcher};
use crate::store::SubscriptionStore;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single delivery failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery buffer full")]
    BufferFull,

    #[error("delivery receiver disconnected")]
    Disconnected,

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Posts a payload to one target.
pub trait DeliverySink<P> {
    fn deliver(&self, target: &str, payload: &P) -> std::result::Result<(), DeliveryError>;
}

/// Outcome of dispatching one event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Targets the payload reached.
    pub delivered: Vec<String>,
    /// Targets that failed, with the reason.
    pub failed: Vec<(String, DeliveryError)>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deliver `payload` to every target whose subscriptions accept `event`.
///
/// Store and decode failures abort before anything is delivered. A failed
/// delivery is recorded in the report and does not stop the others.
pub fn dispatch<S, E, P, D>(
    store: &SubscriptionStore<S>,
    matcher: &EventMatcher<E>,
    event: &E,
    payload: &P,
    sink: &D,
) -> Result<DispatchReport>
where
    S: KvStore,
    E: Event,
    D: DeliverySink<P> + ?Sized,
{
    let targets = store.match_subscriptions(matcher, event)?;
    let mut report = DispatchReport::default();

    for target in targets {
        match sink.deliver(&target, payload) {
            Ok(()) => report.delivered.push(target),
            Err(e) => {
                warn!(kind = event.kind(), channel = %target, error = %e, "delivery failed");
                report.failed.push((target, e));
            }
        }
    }

    debug!(
        kind = event.kind(),
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "dispatched event"
    );
    Ok(report)
}

/// A payload addressed to one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery<P> {
    pub target: String,
    pub payload: P,
}

/// Sink that queues deliveries on a bounded channel for a poster thread.
pub struct ChannelSink<P> {
    sender: Sender<Delivery<P>>,
}

/// Receiving end of a [`ChannelSink`].
pub struct DeliveryReceiver<P> {
    receiver: Receiver<Delivery<P>>,
}

impl<P> ChannelSink<P> {
    /// Create a sink buffering at most `buffer_size` deliveries.
    pub fn bounded(buffer_size: usize) -> (Self, DeliveryReceiver<P>) {
        let (sender, receiver) = bounded(buffer_size);
        (Self { sender }, DeliveryReceiver { receiver })
    }
}

impl<P: Clone> DeliverySink<P> for ChannelSink<P> {
    fn deliver(&self, target: &str, payload: &P) -> std::result::Result<(), DeliveryError> {
        let delivery = Delivery {
            target: target.to_string(),
            payload: payload.clone(),
        };
        match self.sender.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::BufferFull),
            Err(TrySendError::Disconnected(_)) => Err(DeliveryError::Disconnected),
        }
    }
}

impl<P> DeliveryReceiver<P> {
    /// Receive the next delivery (blocking).
    pub fn recv(&self) -> std::result::Result<Delivery<P>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a delivery (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<Delivery<P>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Delivery<P>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Delivery<P>> {
        self.receiver.try_iter().collect()
    }
}
