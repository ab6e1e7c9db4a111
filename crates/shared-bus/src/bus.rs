//! # Message Bus
//!
//! ## Send Pipeline
//!
//! ```text
//! send(sender, recipient, message)
//!   ├─► fingerprint(message)
//!   ├─► lock send path ───────────────────────────────────────┐
//!   │     ├─► budget.try_acquire()  ── None ──► rate_limit_exceeded
//!   │     ├─► envelope { id: msg_<N>, ... }                   │
//!   │     ├─► log.push(envelope)                              │
//!   │     └─► notify(recipient handlers, in order)            │
//!   └─► unlock ◄──────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! The send path is guarded by a re-entrant mutex. Budget check, id
//! assignment, log append and counter increment happen under one borrow of
//! the state, so at most `rate_limit` envelopes are ever accepted and ids
//! never repeat or skip. Notification runs while the mutex is still held but
//! after the borrow is released, which gives two properties:
//!
//! - handlers observe envelopes in log order, across all sending threads;
//! - a handler may call back into the bus (`send`, `broadcast`, `subscribe`,
//!   `status`) on the same thread.
//!
//! A handler must not block on another thread that sends on the same bus.
//!
//! The subscription registry has its own lock and is never held while
//! handlers run.

use crate::budget::SendBudget;
use crate::config::BusConfig;
use crate::delivery::{self, DeliveryAbort};
use crate::envelope::{Envelope, MessageId};
use crate::fingerprint::Fingerprint;
use crate::outcome::{BroadcastResult, BusError, SendRejection, SendResult};
use crate::status::{BusHealth, BusStatus};
use crate::subscriber::{DeliveryResult, Subscriber, SubscriptionRegistry};
use chrono::Utc;
use parking_lot::ReentrantMutex;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Span};

/// State owned by the send path.
struct BusState {
    config: BusConfig,
    budget: SendBudget,
    log: Vec<Envelope>,
}

impl BusState {
    fn new(config: BusConfig) -> Self {
        Self {
            budget: SendBudget::new(config.rate_limit),
            log: Vec::new(),
            config,
        }
    }
}

/// In-process message bus.
///
/// Share it as `Arc<MessageBus>`; every operation takes `&self`.
pub struct MessageBus {
    state: ReentrantMutex<RefCell<BusState>>,
    subscriptions: SubscriptionRegistry,
    span: Span,
}

impl MessageBus {
    /// Create a ready bus with its own `bus` span.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let span = info_span!("bus", protocol = %config.protocol);
        Self::with_span(config, span)
    }

    /// Create a ready bus that logs under `span`.
    #[must_use]
    pub fn with_span(config: BusConfig, span: Span) -> Self {
        {
            let _enter = span.enter();
            info!(
                protocol = %config.protocol,
                encryption = %config.encryption,
                rate_limit = config.rate_limit,
                timeout_ms = config.timeout_ms,
                delivery = ?config.delivery,
                "Message bus initialized"
            );
        }
        Self {
            state: ReentrantMutex::new(RefCell::new(BusState::new(config))),
            subscriptions: SubscriptionRegistry::new(),
            span,
        }
    }

    /// Re-apply configuration and reset the counter and the log.
    ///
    /// Subscriptions are kept. Never fails.
    pub fn initialize(&self, config: BusConfig) {
        let _enter = self.span.enter();
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let dropped = state.log.len();
        info!(
            protocol = %config.protocol,
            rate_limit = config.rate_limit,
            dropped_envelopes = dropped,
            "Message bus re-initialized"
        );
        *state = BusState::new(config);
    }

    /// Send `message` from `sender` to `recipient`.
    ///
    /// Returns `SendResult::Error { reason: RateLimitExceeded }` without side
    /// effects when the budget is exhausted. Otherwise the envelope is logged
    /// and every handler registered under `recipient` is notified in order.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriberFailed`] under
    /// [`DeliveryPolicy::Propagate`](crate::DeliveryPolicy::Propagate) when a
    /// handler fails. The envelope is still logged in that case.
    pub fn send(
        &self,
        sender: &str,
        recipient: &str,
        message: &Value,
    ) -> Result<SendResult, BusError> {
        let _enter = self.span.enter();
        let payload_fingerprint = Fingerprint::of(message);

        let guard = self.state.lock();
        let (envelope, policy) = {
            let mut state = guard.borrow_mut();
            let Some(sequence) = state.budget.try_acquire() else {
                warn!(
                    sender,
                    recipient,
                    rate_limit = state.budget.limit(),
                    "Send rejected (rate limit exceeded)"
                );
                return Ok(SendResult::Error {
                    reason: SendRejection::RateLimitExceeded,
                });
            };

            let envelope = Envelope {
                id: MessageId::new(sequence),
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                payload_fingerprint,
                created_at: Utc::now(),
                protocol: state.config.protocol.clone(),
            };
            state.log.push(envelope.clone());
            (envelope, state.config.delivery)
        };

        let subscribers = self.subscriptions.subscribers(recipient);
        debug!(
            message_id = %envelope.id,
            sender,
            recipient,
            subscribers = subscribers.len(),
            "Envelope accepted"
        );

        let deliveries = delivery::notify(&envelope, &subscribers, policy).map_err(
            |DeliveryAbort { subscriber, reason }| BusError::SubscriberFailed {
                message_id: envelope.id,
                recipient: recipient.to_string(),
                subscriber,
                reason,
            },
        )?;
        drop(guard);

        Ok(SendResult::Success {
            message_id: envelope.id,
            deliveries,
        })
    }

    /// Register `handler` under `subsystem`.
    ///
    /// Returns the number of handlers now registered for `subsystem`.
    pub fn subscribe<F>(&self, subsystem: &str, handler: F) -> usize
    where
        F: Fn(&Envelope) -> DeliveryResult + Send + Sync + 'static,
    {
        self.subscribe_handler(subsystem, Arc::new(handler))
    }

    /// Register an already shared handler under `subsystem`.
    pub fn subscribe_handler(&self, subsystem: &str, handler: Subscriber) -> usize {
        let _enter = self.span.enter();
        let count = self.subscriptions.subscribe(subsystem, handler);
        debug!(subsystem, handlers = count, "Subscription added");
        count
    }

    /// Send `message` from `sender` to every subscribed subsystem except
    /// `sender`, in registry order.
    ///
    /// Targets are snapshotted before the first send. `recipients` counts
    /// attempted sends, rejected ones included.
    ///
    /// # Errors
    ///
    /// The first [`BusError`] raised by an individual send; remaining targets
    /// are skipped.
    pub fn broadcast(&self, sender: &str, message: &Value) -> Result<BroadcastResult, BusError> {
        let targets: Vec<String> = self
            .subscriptions
            .subsystems()
            .into_iter()
            .filter(|target| target != sender)
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            results.push(self.send(sender, target, message)?);
        }

        let result = BroadcastResult::from_results(results);
        let _enter = self.span.enter();
        debug!(
            sender,
            recipients = result.recipients,
            accepted = result.accepted(),
            "Broadcast complete"
        );
        Ok(result)
    }

    /// Read-only status snapshot.
    #[must_use]
    pub fn status(&self) -> BusStatus {
        let guard = self.state.lock();
        let state = guard.borrow();
        BusStatus {
            protocol: state.config.protocol.clone(),
            encryption: state.config.encryption.clone(),
            messages_sent: state.budget.accepted(),
            queue_size: state.log.len(),
            subscribers: self.subscriptions.subsystem_count(),
            rate_limit: state.config.rate_limit,
            timeout_ms: state.config.timeout_ms,
            health: BusHealth::Healthy,
        }
    }

    /// Snapshot of the envelope log, in acceptance order.
    #[must_use]
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.state.lock().borrow().log.clone()
    }

    /// Look up an envelope by id.
    #[must_use]
    pub fn envelope(&self, id: MessageId) -> Option<Envelope> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let position = usize::try_from(id.sequence()).ok()?.checked_sub(1)?;
        state.log.get(position).cloned()
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> BusConfig {
        self.state.lock().borrow().config.clone()
    }

    /// Number of handlers registered under `subsystem`.
    #[must_use]
    pub fn subscriber_count(&self, subsystem: &str) -> usize {
        self.subscriptions.handler_count(subsystem)
    }

    /// Subscribed subsystem names in registry order.
    #[must_use]
    pub fn subscribed_subsystems(&self) -> Vec<String> {
        self.subscriptions.subsystems()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("status", &self.status())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryOutcome, DeliveryPolicy};
    use crate::subscriber::DeliveryError;
    use parking_lot::Mutex;
    use serde_json::json;

    fn bus_with_limit(limit: u64) -> MessageBus {
        MessageBus::new(BusConfig::default().with_rate_limit(limit))
    }

    #[test]
    fn test_default_bus() {
        let bus = MessageBus::default();
        let status = bus.status();
        assert_eq!(status.protocol, "WebSocket");
        assert_eq!(status.encryption, "TLS 1.3");
        assert_eq!(status.rate_limit, 10_000);
        assert_eq!(status.messages_sent, 0);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.subscribers, 0);
        assert_eq!(status.health, BusHealth::Healthy);
    }

    #[test]
    fn test_budget_scenario() {
        let bus = bus_with_limit(2);

        let first = bus.send("A", "B", &json!({"x": 1})).unwrap();
        let second = bus.send("A", "B", &json!({"x": 1})).unwrap();
        let third = bus.send("A", "B", &json!({"x": 2})).unwrap();

        assert_eq!(first.message_id().unwrap().to_string(), "msg_1");
        assert_eq!(second.message_id().unwrap().to_string(), "msg_2");
        assert_eq!(third.rejection(), Some(SendRejection::RateLimitExceeded));

        let log = bus.envelopes();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].payload_fingerprint, log[1].payload_fingerprint);
        assert_eq!(bus.status().messages_sent, 2);
    }

    #[test]
    fn test_envelope_fields() {
        let bus = MessageBus::new(BusConfig::default().with_protocol("InProcess"));
        let message = json!({"vitals": [72, 98]});
        let id = bus.send("vitals", "ui", &message).unwrap().message_id().unwrap();

        let envelope = bus.envelope(id).unwrap();
        assert_eq!(envelope.sender, "vitals");
        assert_eq!(envelope.recipient, "ui");
        assert_eq!(envelope.protocol, "InProcess");
        assert_eq!(envelope.payload_fingerprint, Fingerprint::of(&message));
    }

    #[test]
    fn test_envelope_lookup_out_of_range() {
        let bus = MessageBus::default();
        bus.send("a", "b", &json!(null)).unwrap();
        assert!(bus.envelope(MessageId::new(2)).is_none());
    }

    #[test]
    fn test_fan_out_in_order() {
        let bus = MessageBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["cb1", "cb2"] {
            let seen = seen.clone();
            bus.subscribe("X", move |envelope: &Envelope| {
                seen.lock().push((tag, envelope.clone()));
                Ok(())
            });
        }

        bus.send("Y", "X", &json!({"m": 1})).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "cb1");
        assert_eq!(seen[1].0, "cb2");
        assert_eq!(seen[0].1, seen[1].1);
    }

    #[test]
    fn test_send_to_unknown_recipient() {
        let bus = MessageBus::default();
        let result = bus.send("a", "nobody", &json!(1)).unwrap();
        assert!(result.is_success());
        assert!(result.deliveries().is_empty());
        assert_eq!(bus.status().subscribers, 0);
    }

    #[test]
    fn test_isolated_failure_reported() {
        let bus = MessageBus::default();
        bus.subscribe("X", |_: &Envelope| Err(DeliveryError::new("disk full")));
        bus.subscribe("X", |_: &Envelope| Ok(()));

        let result = bus.send("Y", "X", &json!({})).unwrap();

        let deliveries = result.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(
            deliveries[0].outcome,
            DeliveryOutcome::Failed {
                reason: "disk full".to_string()
            }
        );
        assert!(deliveries[1].is_delivered());
    }

    #[test]
    fn test_propagated_failure_keeps_envelope() {
        let bus = MessageBus::new(BusConfig::default().with_delivery(DeliveryPolicy::Propagate));
        let second_called = Arc::new(Mutex::new(false));
        bus.subscribe("X", |_: &Envelope| Err(DeliveryError::new("boom")));
        {
            let second_called = second_called.clone();
            bus.subscribe("X", move |_: &Envelope| {
                *second_called.lock() = true;
                Ok(())
            });
        }

        let err = bus.send("Y", "X", &json!({})).unwrap_err();

        assert!(matches!(
            err,
            BusError::SubscriberFailed { subscriber: 0, ref recipient, .. } if recipient == "X"
        ));
        assert!(!*second_called.lock());
        assert_eq!(bus.status().messages_sent, 1);
        assert_eq!(bus.envelopes().len(), 1);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let bus = MessageBus::default();
        for name in ["A", "B", "C"] {
            bus.subscribe(name, |_: &Envelope| Ok(()));
        }

        let result = bus.broadcast("A", &json!({"hello": true})).unwrap();

        assert_eq!(result.recipients, 2);
        let recipients: Vec<String> = bus.envelopes().into_iter().map(|e| e.recipient).collect();
        assert_eq!(recipients, vec!["B", "C"]);
    }

    #[test]
    fn test_broadcast_counts_rejected_sends() {
        let bus = bus_with_limit(1);
        for name in ["A", "B", "C"] {
            bus.subscribe(name, |_: &Envelope| Ok(()));
        }

        let result = bus.broadcast("A", &json!({})).unwrap();

        assert_eq!(result.recipients, 2);
        assert_eq!(result.accepted(), 1);
        assert_eq!(
            result.results[1].rejection(),
            Some(SendRejection::RateLimitExceeded)
        );
    }

    #[test]
    fn test_broadcast_from_unsubscribed_sender() {
        let bus = MessageBus::default();
        bus.subscribe("A", |_: &Envelope| Ok(()));
        bus.subscribe("B", |_: &Envelope| Ok(()));

        let result = bus.broadcast("runtime", &json!({})).unwrap();
        assert_eq!(result.recipients, 2);
    }

    #[test]
    fn test_status_is_pure() {
        let bus = MessageBus::default();
        bus.subscribe("A", |_: &Envelope| Ok(()));
        bus.send("B", "A", &json!(1)).unwrap();

        let before = bus.status();
        for _ in 0..10 {
            let _ = bus.status();
        }
        assert_eq!(bus.status(), before);
    }

    #[test]
    fn test_initialize_resets_log_keeps_subscriptions() {
        let bus = bus_with_limit(1);
        bus.subscribe("A", |_: &Envelope| Ok(()));
        bus.send("B", "A", &json!(1)).unwrap();
        assert!(!bus.send("B", "A", &json!(1)).unwrap().is_success());

        bus.initialize(BusConfig::default().with_rate_limit(5));

        let status = bus.status();
        assert_eq!(status.messages_sent, 0);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.rate_limit, 5);
        assert_eq!(status.subscribers, 1);

        let id = bus.send("B", "A", &json!(1)).unwrap().message_id().unwrap();
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn test_handler_can_send_reentrantly() {
        let bus = Arc::new(MessageBus::default());
        {
            let inner = Arc::downgrade(&bus);
            bus.subscribe("ping", move |envelope: &Envelope| {
                let bus = inner
                    .upgrade()
                    .ok_or_else(|| DeliveryError::new("bus dropped"))?;
                bus.send("ping", &envelope.sender, &json!({"pong": true}))
                    .map(|_| ())
                    .map_err(|e| DeliveryError::new(e.to_string()))
            });
        }

        bus.send("client", "ping", &json!({"ping": true})).unwrap();

        let log = bus.envelopes();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].sender, "ping");
        assert_eq!(log[1].recipient, "client");
    }

    #[test]
    fn test_handler_can_subscribe_while_notified() {
        let bus = Arc::new(MessageBus::default());
        {
            let inner = Arc::downgrade(&bus);
            bus.subscribe("X", move |_: &Envelope| {
                if let Some(bus) = inner.upgrade() {
                    bus.subscribe("late", |_: &Envelope| Ok(()));
                }
                Ok(())
            });
        }

        bus.send("Y", "X", &json!(1)).unwrap();
        assert_eq!(bus.subscriber_count("late"), 1);
        assert_eq!(bus.subscribed_subsystems(), vec!["X", "late"]);
    }
}
