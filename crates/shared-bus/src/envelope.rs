//! # Envelope
//!
//! The immutable record of one accepted message transit between two
//! subsystems. Envelopes only exist for accepted sends; a rejected send never
//! produces one.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every rendered message id.
pub const MESSAGE_ID_PREFIX: &str = "msg_";

/// Error parsing a message id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid message id: {0:?} (expected msg_<N> with N >= 1)")]
pub struct MessageIdParseError(String);

/// Identifier of an accepted message, rendered as `msg_<N>`.
///
/// `N` is the 1-based value of the send counter when the envelope was
/// accepted, so ids are unique and strictly increasing per bus and
/// `msg_N` is always the `N`-th entry of the envelope log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The 1-based sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MESSAGE_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = MessageIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(MESSAGE_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Self)
            .ok_or_else(|| MessageIdParseError(s.to_string()))
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = MessageIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl PartialEq<&str> for MessageId {
    fn eq(&self, other: &&str) -> bool {
        other.parse::<MessageId>().is_ok_and(|id| id == *self)
    }
}

/// One accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// `msg_<N>`.
    pub id: MessageId,
    /// Sending subsystem name. Not checked against the registry.
    pub sender: String,
    /// Receiving subsystem name. Not checked against the registry.
    pub recipient: String,
    /// One-way digest of the original content.
    pub payload_fingerprint: Fingerprint,
    /// Moment the envelope was accepted into the log.
    pub created_at: DateTime<Utc>,
    /// Protocol label configured on the bus at acceptance time.
    pub protocol: String,
}
