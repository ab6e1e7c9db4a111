//! # Compliance Ledger
//!
//! Append-only ledger of monetary entries. Every entry is checked against the
//! compliance rules before it is recorded:
//!
//! - the account is not empty;
//! - the amount is positive;
//! - the amount does not exceed `max_amount_cents`.
//!
//! Accepted entries are announced to `ui`. Rejected attempts are counted; the
//! ledger reports itself degraded once more than half of all attempts were
//! rejected.

use super::ui_renderer::UI_MODULE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{BusError, DeliveryError, Envelope, MessageBus, MessageId};
use shared_types::{Capabilities, Module, ModuleError, ModuleHealth};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn, Span};
use uuid::Uuid;

/// Bus name of the ledger.
pub const LEDGER_MODULE: &str = "ledger";

/// Default per-entry ceiling, in cents.
pub const DEFAULT_MAX_AMOUNT_CENTS: i64 = 1_000_000;

/// Ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Largest amount a single entry may carry.
    pub max_amount_cents: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_amount_cents: DEFAULT_MAX_AMOUNT_CENTS,
        }
    }
}

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger is not running")]
    NotRunning,

    #[error("Compliance violation: account must not be empty")]
    EmptyAccount,

    #[error("Compliance violation: amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Compliance violation: amount {amount} exceeds limit {limit}")]
    AmountOverLimit { amount: i64, limit: i64 },

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl LedgerError {
    /// Whether this error is a compliance rule violation.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::EmptyAccount | Self::NonPositiveAmount(_) | Self::AmountOverLimit { .. }
        )
    }
}

/// One recorded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account: String,
    pub amount_cents: i64,
    pub memo: String,
    pub recorded_at: DateTime<Utc>,
    /// Envelope announcing the entry to `ui`; `None` when the bus budget was
    /// exhausted.
    pub notification: Option<MessageId>,
}

#[derive(Default)]
struct LedgerState {
    running: bool,
    entries: Vec<LedgerEntry>,
    violations: u64,
    received: u64,
}

impl LedgerState {
    fn attempts(&self) -> u64 {
        self.entries.len() as u64 + self.violations
    }
}

/// The `ledger` module.
pub struct ComplianceLedger {
    bus: Arc<MessageBus>,
    config: LedgerConfig,
    state: Arc<Mutex<LedgerState>>,
    subscribed: AtomicBool,
    span: Span,
}

impl ComplianceLedger {
    pub fn new(bus: Arc<MessageBus>, config: LedgerConfig, span: Span) -> Self {
        Self {
            bus,
            config,
            state: Arc::new(Mutex::new(LedgerState::default())),
            subscribed: AtomicBool::new(false),
            span,
        }
    }

    /// Validate and record an entry, then notify `ui`.
    ///
    /// # Errors
    ///
    /// - `NotRunning` before `initialize` or after `shutdown`
    /// - a compliance violation (counted towards the ledger's health)
    /// - `Bus` when `ui` fails under the propagate delivery policy; the entry
    ///   is recorded regardless
    pub fn record(
        &self,
        account: &str,
        amount_cents: i64,
        memo: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let _enter = self.span.enter();
        let mut entry = {
            let mut state = self.state.lock();
            if !state.running {
                return Err(LedgerError::NotRunning);
            }
            if let Err(violation) = self.check(account, amount_cents) {
                state.violations += 1;
                warn!(account, amount_cents, error = %violation, "Entry rejected");
                return Err(violation);
            }
            let entry = LedgerEntry {
                id: Uuid::new_v4(),
                account: account.to_string(),
                amount_cents,
                memo: memo.to_string(),
                recorded_at: Utc::now(),
                notification: None,
            };
            state.entries.push(entry.clone());
            entry
        };

        let sent = self.bus.send(
            LEDGER_MODULE,
            UI_MODULE,
            &json!({
                "event": "entry_recorded",
                "id": entry.id,
                "account": entry.account,
                "amountCents": entry.amount_cents,
            }),
        )?;
        match sent.message_id() {
            Some(message_id) => {
                entry.notification = Some(message_id);
                let mut state = self.state.lock();
                if let Some(stored) = state.entries.iter_mut().find(|e| e.id == entry.id) {
                    stored.notification = Some(message_id);
                }
            }
            None => warn!(entry_id = %entry.id, "Entry notification rejected by bus"),
        }

        info!(entry_id = %entry.id, account, amount_cents, "Entry recorded");
        Ok(entry)
    }

    fn check(&self, account: &str, amount_cents: i64) -> Result<(), LedgerError> {
        if account.trim().is_empty() {
            return Err(LedgerError::EmptyAccount);
        }
        if amount_cents <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount_cents));
        }
        if amount_cents > self.config.max_amount_cents {
            return Err(LedgerError::AmountOverLimit {
                amount: amount_cents,
                limit: self.config.max_amount_cents,
            });
        }
        Ok(())
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().entries.clone()
    }

    /// Sum of all entries for `account`.
    pub fn balance(&self, account: &str) -> i64 {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.account == account)
            .map(|e| e.amount_cents)
            .sum()
    }

    /// Rejected attempts so far.
    pub fn violations(&self) -> u64 {
        self.state.lock().violations
    }
}

#[async_trait]
impl Module for ComplianceLedger {
    fn name(&self) -> &str {
        LEDGER_MODULE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_shutdown().with_health_check()
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        if self.config.max_amount_cents <= 0 {
            return Err(ModuleError::initialization(
                LEDGER_MODULE,
                format!("maxAmountCents must be positive, got {}", self.config.max_amount_cents),
            ));
        }
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let state = Arc::clone(&self.state);
            self.bus.subscribe(LEDGER_MODULE, move |_: &Envelope| {
                let mut state = state.lock();
                if !state.running {
                    return Err(DeliveryError::new("ledger is not running"));
                }
                state.received += 1;
                Ok(())
            });
        }
        self.state.lock().running = true;
        self.span.in_scope(|| {
            info!(max_amount_cents = self.config.max_amount_cents, "Ledger ready")
        });
        Ok(())
    }

    fn status(&self) -> serde_json::Value {
        let state = self.state.lock();
        json!({
            "running": state.running,
            "entries": state.entries.len(),
            "violations": state.violations,
            "received": state.received,
            "maxAmountCents": self.config.max_amount_cents,
        })
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        let mut state = self.state.lock();
        state.running = false;
        self.span
            .in_scope(|| info!(entries = state.entries.len(), "Ledger closed"));
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        let state = self.state.lock();
        if !state.running {
            return ModuleHealth::Unhealthy {
                reason: "ledger is not running".to_string(),
            };
        }
        let attempts = state.attempts();
        if attempts > 0 && state.violations * 2 > attempts {
            return ModuleHealth::Degraded {
                reason: format!("{} of {attempts} entries rejected", state.violations),
            };
        }
        ModuleHealth::Healthy
    }
}
