//! # Send and Broadcast Results
//!
//! Wire shape (serde):
//!
//! ```text
//! {"status":"success","message_id":"msg_1","deliveries":[...]}
//! {"status":"error","reason":"rate_limit_exceeded"}
//! {"status":"success","recipients":2,"results":[...]}
//! ```

use crate::delivery::DeliveryReport;
use crate::envelope::MessageId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a send was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendRejection {
    /// The send budget is exhausted.
    #[error("rate limit exceeded")]
    RateLimitExceeded,
}

/// Result of a single send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendResult {
    /// The envelope was accepted and logged.
    Success {
        message_id: MessageId,
        /// One report per recipient handler, in notification order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deliveries: Vec<DeliveryReport>,
    },
    /// The send was rejected; nothing was logged.
    Error { reason: SendRejection },
}

impl SendResult {
    /// Check if the envelope was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Id of the accepted envelope.
    #[must_use]
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Success { message_id, .. } => Some(*message_id),
            Self::Error { .. } => None,
        }
    }

    /// Rejection reason, if rejected.
    #[must_use]
    pub fn rejection(&self) -> Option<SendRejection> {
        match self {
            Self::Success { .. } => None,
            Self::Error { reason } => Some(*reason),
        }
    }

    /// Per-handler delivery reports (empty when rejected).
    #[must_use]
    pub fn deliveries(&self) -> &[DeliveryReport] {
        match self {
            Self::Success { deliveries, .. } => deliveries,
            Self::Error { .. } => &[],
        }
    }
}

/// Broadcast status. A broadcast itself always succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Success,
}

/// Result of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub status: BroadcastStatus,
    /// Number of sends attempted, including rejected ones.
    pub recipients: usize,
    /// One send result per target, in registry order.
    pub results: Vec<SendResult>,
}

impl BroadcastResult {
    pub(crate) fn from_results(results: Vec<SendResult>) -> Self {
        Self {
            status: BroadcastStatus::Success,
            recipients: results.len(),
            results,
        }
    }

    /// Number of sends that were accepted.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// Errors returned by bus operations.
///
/// Only raised under [`DeliveryPolicy::Propagate`](crate::DeliveryPolicy::Propagate);
/// the envelope named here stays in the log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A recipient handler failed and notification was aborted.
    #[error("Subscriber {subscriber} of {recipient} failed on {message_id}: {reason}")]
    SubscriberFailed {
        message_id: MessageId,
        recipient: String,
        subscriber: usize,
        reason: String,
    },
}
