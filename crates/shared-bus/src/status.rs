//! # Bus Status

use serde::{Deserialize, Serialize};

/// Health reported by the bus. The bus has no failure states of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusHealth {
    #[default]
    Healthy,
}

/// Read-only snapshot returned by [`MessageBus::status`](crate::MessageBus::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStatus {
    /// Configured protocol label.
    pub protocol: String,
    /// Configured confidentiality label.
    pub encryption: String,
    /// Accepted sends since the last initialization.
    pub messages_sent: u64,
    /// Envelopes in the log. Always equal to `messages_sent`.
    pub queue_size: usize,
    /// Distinct subscribed subsystems.
    pub subscribers: usize,
    /// Configured send budget.
    pub rate_limit: u64,
    /// Advisory timeout in milliseconds.
    pub timeout_ms: u64,
    pub health: BusHealth,
}
