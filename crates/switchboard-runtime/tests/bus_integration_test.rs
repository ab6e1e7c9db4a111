//! # Bus Integration Tests
//!
//! End-to-end behaviour of the message bus as modules see it:
//!
//! - the send budget is exact, also under concurrent senders;
//! - ids are `msg_1..msg_N` without gaps;
//! - handlers observe envelopes in log order;
//! - broadcast counts attempted sends;
//! - delivery failures follow the configured policy.

use parking_lot::Mutex;
use serde_json::json;
use shared_bus::{
    BusConfig, BusError, DeliveryError, DeliveryPolicy, Envelope, Fingerprint, MessageBus,
    MessageId, SendRejection,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn bus_with_budget(rate_limit: u64) -> Arc<MessageBus> {
    Arc::new(MessageBus::new(BusConfig::default().with_rate_limit(rate_limit)))
}

#[test]
fn test_budget_scenario() {
    let bus = bus_with_budget(2);

    let first = bus.send("A", "B", &json!({"x": 1})).unwrap();
    let second = bus.send("A", "B", &json!({"x": 1})).unwrap();
    let third = bus.send("A", "B", &json!({"x": 2})).unwrap();

    assert_eq!(first.message_id().unwrap(), "msg_1");
    assert_eq!(second.message_id().unwrap(), "msg_2");
    assert_eq!(third.rejection(), Some(SendRejection::RateLimitExceeded));

    let log = bus.envelopes();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].payload_fingerprint, log[1].payload_fingerprint);
    assert_eq!(bus.status().messages_sent, 2);
}

#[test]
fn test_concurrent_senders_respect_budget() {
    const THREADS: usize = 8;
    const SENDS_PER_THREAD: usize = 50;
    const BUDGET: u64 = 300;

    let bus = bus_with_budget(BUDGET);
    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let observed = Arc::clone(&observed);
        bus.subscribe("sink", move |envelope: &Envelope| {
            observed.lock().push(envelope.id);
            Ok(())
        });
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let mut accepted = Vec::new();
                for i in 0..SENDS_PER_THREAD {
                    let sender = format!("sender-{t}");
                    let result = bus.send(&sender, "sink", &json!({"t": t, "i": i})).unwrap();
                    if let Some(id) = result.message_id() {
                        accepted.push(id);
                    }
                }
                accepted
            })
        })
        .collect();

    let accepted: Vec<MessageId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(accepted.len() as u64, BUDGET);
    let unique: HashSet<u64> = accepted.iter().map(MessageId::sequence).collect();
    assert_eq!(unique, (1..=BUDGET).collect::<HashSet<_>>());

    let status = bus.status();
    assert_eq!(status.messages_sent, BUDGET);
    assert_eq!(status.queue_size as u64, BUDGET);

    // Handlers saw every accepted envelope, in log order.
    let log_order: Vec<MessageId> = bus.envelopes().iter().map(|e| e.id).collect();
    assert_eq!(*observed.lock(), log_order);
    let sequences: Vec<u64> = log_order.iter().map(MessageId::sequence).collect();
    assert_eq!(sequences, (1..=BUDGET).collect::<Vec<_>>());
}

#[test]
fn test_fingerprint_ignores_key_order() {
    let bus = bus_with_budget(10);
    bus.send("A", "B", &json!({"a": 1, "b": [1, 2]})).unwrap();
    bus.send("A", "B", &json!({"b": [1, 2], "a": 1})).unwrap();
    bus.send("A", "B", &json!({"a": 1, "b": [2, 1]})).unwrap();

    let log = bus.envelopes();
    assert_eq!(log[0].payload_fingerprint, log[1].payload_fingerprint);
    assert_ne!(log[0].payload_fingerprint, log[2].payload_fingerprint);
    assert_eq!(
        log[0].payload_fingerprint,
        Fingerprint::of(&json!({"b": [1, 2], "a": 1}))
    );
}

#[test]
fn test_fan_out_in_registration_order() {
    let bus = bus_with_budget(10);
    let calls = Arc::new(Mutex::new(Vec::new()));
    for label in ["cb1", "cb2"] {
        let calls = Arc::clone(&calls);
        bus.subscribe("X", move |envelope: &Envelope| {
            calls.lock().push((label, envelope.clone()));
            Ok(())
        });
    }

    bus.send("A", "X", &json!({"hello": "world"})).unwrap();

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "cb1");
    assert_eq!(calls[1].0, "cb2");
    assert_eq!(calls[0].1, calls[1].1);
}

#[test]
fn test_broadcast_counts_rejected_sends() {
    let bus = bus_with_budget(1);
    for name in ["A", "B", "C"] {
        bus.subscribe(name, |_: &Envelope| Ok(()));
    }

    let result = bus.broadcast("A", &json!({"event": "ping"})).unwrap();
    assert_eq!(result.recipients, 2);
    assert_eq!(result.accepted(), 1);

    let targets: Vec<String> = bus.envelopes().into_iter().map(|e| e.recipient).collect();
    assert_eq!(targets, vec!["B"]);
}

#[test]
fn test_status_is_pure() {
    let bus = bus_with_budget(5);
    bus.subscribe("B", |_: &Envelope| Ok(()));
    bus.send("A", "B", &json!(1)).unwrap();

    let before = bus.status();
    let again = bus.status();
    assert_eq!(before, again);
    assert_eq!(bus.envelopes().len(), 1);
    assert_eq!(before.subscribers, 1);
}

#[test]
fn test_isolate_reports_each_handler() {
    let bus = bus_with_budget(5);
    bus.subscribe("B", |_: &Envelope| Err(DeliveryError::new("busy")));
    bus.subscribe("B", |_: &Envelope| -> Result<(), DeliveryError> { panic!("boom") });
    bus.subscribe("B", |_: &Envelope| Ok(()));

    let result = bus.send("A", "B", &json!({})).unwrap();
    let delivered: Vec<bool> = result.deliveries().iter().map(|d| d.is_delivered()).collect();
    assert_eq!(delivered, vec![false, false, true]);
}

#[test]
fn test_propagate_aborts_and_keeps_envelope() {
    let bus = Arc::new(MessageBus::new(
        BusConfig::default().with_delivery(DeliveryPolicy::Propagate),
    ));
    let reached = Arc::new(Mutex::new(false));
    bus.subscribe("B", |_: &Envelope| Err(DeliveryError::new("refused")));
    {
        let reached = Arc::clone(&reached);
        bus.subscribe("B", move |_: &Envelope| {
            *reached.lock() = true;
            Ok(())
        });
    }

    match bus.send("A", "B", &json!({})) {
        Err(BusError::SubscriberFailed {
            message_id,
            subscriber,
            reason,
            ..
        }) => {
            assert_eq!(message_id, "msg_1");
            assert_eq!(subscriber, 0);
            assert_eq!(reason, "refused");
        }
        other => panic!("expected SubscriberFailed, got {other:?}"),
    }
    assert!(!*reached.lock());
    assert_eq!(bus.status().messages_sent, 1);
}

#[test]
fn test_initialize_resets_log_keeps_subscriptions() {
    let bus = bus_with_budget(1);
    bus.subscribe("B", |_: &Envelope| Ok(()));
    bus.send("A", "B", &json!({})).unwrap();
    assert!(!bus.send("A", "B", &json!({})).unwrap().is_success());

    bus.initialize(BusConfig::default().with_rate_limit(1).with_protocol("gRPC"));

    let result = bus.send("A", "B", &json!({})).unwrap();
    assert_eq!(result.message_id().unwrap(), "msg_1");
    assert_eq!(bus.envelopes()[0].protocol, "gRPC");
    assert_eq!(bus.subscriber_count("B"), 1);
}
