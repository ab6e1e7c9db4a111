//! # Subscriber Notification
//!
//! Invokes the handlers of a recipient, in registration order, for one
//! accepted envelope. Handler panics are caught and reported as failures.
//!
//! The [`DeliveryPolicy`] decides what a failure does to the rest of the
//! notification:
//!
//! - [`DeliveryPolicy::Isolate`]: every handler runs and each outcome is
//!   reported back to the sender.
//! - [`DeliveryPolicy::Propagate`]: the first failure stops notification and
//!   is returned to the sender as an error.

use crate::envelope::Envelope;
use crate::subscriber::Subscriber;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// How subscriber failures affect a send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Run every handler and report per-handler outcomes.
    #[default]
    Isolate,
    /// Abort at the first failing handler and fail the send.
    Propagate,
}

/// Error parsing a delivery policy name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown delivery policy: {0:?} (expected \"isolate\" or \"propagate\")")]
pub struct UnknownDeliveryPolicy(String);

impl FromStr for DeliveryPolicy {
    type Err = UnknownDeliveryPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "propagate" => Ok(Self::Propagate),
            _ => Err(UnknownDeliveryPolicy(s.to_string())),
        }
    }
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Handler returned `Ok`.
    Delivered,
    /// Handler returned an error or panicked.
    Failed { reason: String },
}

/// Per-handler delivery report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// 0-based position of the handler in the recipient's list.
    pub subscriber: usize,
    /// What happened.
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    /// Check if the handler accepted the envelope.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered)
    }
}

/// First failure under [`DeliveryPolicy::Propagate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeliveryAbort {
    pub subscriber: usize,
    pub reason: String,
}

/// Notify `subscribers` of `envelope` under `policy`.
pub(crate) fn notify(
    envelope: &Envelope,
    subscribers: &[Subscriber],
    policy: DeliveryPolicy,
) -> Result<Vec<DeliveryReport>, DeliveryAbort> {
    let mut reports = Vec::with_capacity(subscribers.len());

    for (index, subscriber) in subscribers.iter().enumerate() {
        let outcome = match invoke(subscriber, envelope) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(reason) => {
                warn!(
                    message_id = %envelope.id,
                    recipient = %envelope.recipient,
                    subscriber = index,
                    reason = %reason,
                    "Subscriber failed"
                );
                if policy == DeliveryPolicy::Propagate {
                    return Err(DeliveryAbort {
                        subscriber: index,
                        reason,
                    });
                }
                DeliveryOutcome::Failed { reason }
            }
        };
        reports.push(DeliveryReport {
            subscriber: index,
            outcome,
        });
    }

    Ok(reports)
}

fn invoke(subscriber: &Subscriber, envelope: &Envelope) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| subscriber.handle(envelope))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.reason),
        Err(panic_err) => {
            let any = &*panic_err;
            let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = any.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(format!("subscriber panicked: {info}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageId;
    use crate::fingerprint::Fingerprint;
    use crate::subscriber::{DeliveryError, DeliveryResult};
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn envelope() -> Envelope {
        Envelope {
            id: MessageId::new(1),
            sender: "a".to_string(),
            recipient: "b".to_string(),
            payload_fingerprint: Fingerprint::of_bytes(b"{}"),
            created_at: Utc::now(),
            protocol: "WebSocket".to_string(),
        }
    }

    fn recording(calls: &Arc<Mutex<Vec<usize>>>, tag: usize) -> Subscriber {
        let calls = calls.clone();
        Arc::new(move |_: &Envelope| -> DeliveryResult {
            calls.lock().push(tag);
            Ok(())
        })
    }

    fn failing() -> Subscriber {
        Arc::new(|_: &Envelope| -> DeliveryResult { Err(DeliveryError::new("boom")) })
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("isolate".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::Isolate);
        assert_eq!(" Propagate ".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::Propagate);
        assert!("drop".parse::<DeliveryPolicy>().is_err());
    }

    #[test]
    fn test_isolate_runs_every_handler() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let subs = vec![recording(&calls, 0), failing(), recording(&calls, 2)];

        let reports = notify(&envelope(), &subs, DeliveryPolicy::Isolate).unwrap();

        assert_eq!(*calls.lock(), vec![0, 2]);
        assert_eq!(reports.len(), 3);
        assert!(reports[0].is_delivered());
        assert_eq!(
            reports[1].outcome,
            DeliveryOutcome::Failed {
                reason: "boom".to_string()
            }
        );
        assert!(reports[2].is_delivered());
    }

    #[test]
    fn test_propagate_stops_at_first_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let subs = vec![recording(&calls, 0), failing(), recording(&calls, 2)];

        let abort = notify(&envelope(), &subs, DeliveryPolicy::Propagate).unwrap_err();

        assert_eq!(*calls.lock(), vec![0]);
        assert_eq!(abort.subscriber, 1);
        assert_eq!(abort.reason, "boom");
    }

    #[test]
    fn test_panic_is_caught() {
        let subs: Vec<Subscriber> =
            vec![Arc::new(|_: &Envelope| -> DeliveryResult { panic!("kaboom") })];

        let reports = notify(&envelope(), &subs, DeliveryPolicy::Isolate).unwrap();

        match &reports[0].outcome {
            DeliveryOutcome::Failed { reason } => assert!(reason.contains("kaboom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_report_serialization() {
        let report = DeliveryReport {
            subscriber: 1,
            outcome: DeliveryOutcome::Failed {
                reason: "boom".to_string(),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["subscriber"], 1);
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["reason"], "boom");
    }
}
