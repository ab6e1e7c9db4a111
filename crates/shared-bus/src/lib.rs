//! # Shared Bus - In-Process Message Bus
//!
//! Lets independently registered subsystems exchange envelopes under a global
//! send budget.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                      ┌──────────────┐
//! │ Subsystem A  │                      │ Subsystem B  │
//! │              │  send(A, B, msg)     │  handler(s)  │
//! │              │ ──────┐              │              │
//! └──────────────┘       │              └──────────────┘
//!                        ▼                     ↑
//!                  ┌──────────────┐            │
//!                  │ Message Bus  │ ───────────┘
//!                  │ budget + log │  notify in order
//!                  └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Hard budget:** at most `rate_limit` envelopes are ever accepted.
//! - **Ordered ids:** accepted envelopes are `msg_1, msg_2, ...` with no gaps.
//! - **Fingerprint only:** content is reduced to a SHA-256 fingerprint; the
//!   bus never stores or forwards the original message.
//! - **Ordered delivery:** handlers see envelopes in log order.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod budget;
pub mod bus;
pub mod config;
pub mod delivery;
pub mod envelope;
pub mod fingerprint;
pub mod outcome;
pub mod status;
pub mod subscriber;

pub use budget::SendBudget;
pub use bus::MessageBus;
pub use config::{
    BusConfig, InvalidOverride, DEFAULT_ENCRYPTION, DEFAULT_PROTOCOL, DEFAULT_RATE_LIMIT, DEFAULT_TIMEOUT_MS,
};
pub use delivery::{DeliveryOutcome, DeliveryPolicy, DeliveryReport};
pub use envelope::{Envelope, MessageId, MESSAGE_ID_PREFIX};
pub use fingerprint::Fingerprint;
pub use outcome::{BroadcastResult, BroadcastStatus, BusError, SendRejection, SendResult};
pub use status::{BusHealth, BusStatus};
pub use subscriber::{
    DeliveryError, DeliveryResult, EnvelopeHandler, Subscriber, SubscriptionRegistry,
};
