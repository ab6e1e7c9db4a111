//! # Bus Configuration
//!
//! Every field is optional on the wire and falls back to the defaults below.
//! Field names follow the camelCase configuration surface (`rateLimit`,
//! `timeout`).

use crate::delivery::DeliveryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default logical transport label.
pub const DEFAULT_PROTOCOL: &str = "WebSocket";

/// Default confidentiality mode label (informational only).
pub const DEFAULT_ENCRYPTION: &str = "TLS 1.3";

/// Default send budget.
pub const DEFAULT_RATE_LIMIT: u64 = 10_000;

/// Default advisory timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configuration applied by [`MessageBus::initialize`](crate::MessageBus::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusConfig {
    /// Label stamped on every envelope as its protocol tag.
    pub protocol: String,

    /// Confidentiality mode label. Cosmetic; the bus only fingerprints content.
    pub encryption: String,

    /// Maximum number of envelopes accepted before sends are rejected.
    pub rate_limit: u64,

    /// Advisory timeout in milliseconds. Stored and reported, never enforced.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    /// How subscriber failures affect the outcome of a send.
    pub delivery: DeliveryPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            encryption: DEFAULT_ENCRYPTION.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            delivery: DeliveryPolicy::default(),
        }
    }
}

impl BusConfig {
    /// Set the send budget.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u64) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the protocol label.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the delivery policy.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    /// Advisory timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// # Environment Variables
    ///
    /// - `SB_PROTOCOL`: protocol label
    /// - `SB_ENCRYPTION`: confidentiality label
    /// - `SB_RATE_LIMIT`: send budget
    /// - `SB_TIMEOUT_MS`: advisory timeout
    /// - `SB_DELIVERY`: `isolate` or `propagate`
    ///
    /// # Errors
    ///
    /// [`InvalidOverride`] naming the first unparseable numeric or policy value.
    pub fn with_env_overrides(self) -> Result<Self, InvalidOverride> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides read through `lookup`, keyed by the variable names
    /// listed on [`BusConfig::with_env_overrides`].
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, InvalidOverride> {
        if let Some(protocol) = lookup("SB_PROTOCOL") {
            self.protocol = protocol;
        }
        if let Some(encryption) = lookup("SB_ENCRYPTION") {
            self.encryption = encryption;
        }
        if let Some(value) = lookup("SB_RATE_LIMIT") {
            self.rate_limit = parse_override("SB_RATE_LIMIT", value)?;
        }
        if let Some(value) = lookup("SB_TIMEOUT_MS") {
            self.timeout_ms = parse_override("SB_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("SB_DELIVERY") {
            self.delivery = parse_override("SB_DELIVERY", value)?;
        }
        Ok(self)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, InvalidOverride> {
        Self::default().with_env_overrides()
    }
}

/// An override value that does not parse for its key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid value for {key}: {value:?}")]
pub struct InvalidOverride {
    pub key: &'static str,
    pub value: String,
}

fn parse_override<T: FromStr>(key: &'static str, value: String) -> Result<T, InvalidOverride> {
    let parsed = value.trim().parse();
    parsed.map_err(|_| InvalidOverride { key, value })
}
