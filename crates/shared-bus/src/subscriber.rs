//! # Subscription Registry
//!
//! Maps a subsystem name to its ordered notification handlers.
//!
//! - Handlers are invoked in registration order.
//! - Subsystem names iterate in the order they first subscribed; this is the
//!   broadcast target order.
//! - No deduplication and no unsubscribe: a handler registered twice runs
//!   twice, and registrations live as long as the bus.

use crate::envelope::Envelope;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a subscriber for one envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{reason}")]
pub struct DeliveryError {
    /// Human-readable failure reason.
    pub reason: String,
}

impl DeliveryError {
    /// Create a delivery error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a single handler invocation.
pub type DeliveryResult = Result<(), DeliveryError>;

/// Receives envelopes addressed to the subsystem it is registered under.
///
/// Implemented for every `Fn(&Envelope) -> DeliveryResult`, so closures can be
/// registered directly.
pub trait EnvelopeHandler: Send + Sync {
    /// Handle one envelope.
    fn handle(&self, envelope: &Envelope) -> DeliveryResult;
}

impl<F> EnvelopeHandler for F
where
    F: Fn(&Envelope) -> DeliveryResult + Send + Sync,
{
    fn handle(&self, envelope: &Envelope) -> DeliveryResult {
        self(envelope)
    }
}

/// Shared handle to a registered handler.
pub type Subscriber = Arc<dyn EnvelopeHandler>;

#[derive(Default)]
struct RegistryInner {
    /// Position of each subsystem in `entries`.
    index: HashMap<String, usize>,
    /// Subsystems in first-subscription order.
    entries: Vec<(String, Vec<Subscriber>)>,
}

/// Subscription registry with its own lock, independent of the send path.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to `subsystem`, creating the entry if absent.
    ///
    /// Returns the number of handlers now registered for `subsystem`.
    pub fn subscribe(&self, subsystem: &str, handler: Subscriber) -> usize {
        let mut inner = self.inner.write();
        let position = match inner.index.get(subsystem) {
            Some(&position) => position,
            None => {
                let position = inner.entries.len();
                inner.entries.push((subsystem.to_string(), Vec::new()));
                inner.index.insert(subsystem.to_string(), position);
                position
            }
        };
        let handlers = &mut inner.entries[position].1;
        handlers.push(handler);
        handlers.len()
    }

    /// Snapshot of the handlers for `subsystem`, in registration order.
    ///
    /// The lock is released before the caller invokes anything, so handlers
    /// may subscribe further handlers while being notified.
    #[must_use]
    pub fn subscribers(&self, subsystem: &str) -> Vec<Subscriber> {
        let inner = self.inner.read();
        inner
            .index
            .get(subsystem)
            .map(|&position| inner.entries[position].1.clone())
            .unwrap_or_default()
    }

    /// Subscribed subsystem names in first-subscription order.
    #[must_use]
    pub fn subsystems(&self) -> Vec<String> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of distinct subscribed subsystems.
    #[must_use]
    pub fn subsystem_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Number of handlers registered for `subsystem`.
    #[must_use]
    pub fn handler_count(&self, subsystem: &str) -> usize {
        let inner = self.inner.read();
        inner
            .index
            .get(subsystem)
            .map_or(0, |&position| inner.entries[position].1.len())
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_map()
            .entries(inner.entries.iter().map(|(name, h)| (name, h.len())))
            .finish()
    }
}
