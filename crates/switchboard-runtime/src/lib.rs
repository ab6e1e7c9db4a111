//! # Switchboard Runtime
//!
//! Wires the message bus to the modules that use it.
//!
//! ## Modular Structure
//!
//! - `config` - Runtime configuration (JSON file plus environment overrides)
//! - `subsystems` - The `ui`, `ledger`, `vitals` and `community` modules
//! - `runtime` - Bus and registry ownership, lifecycle, heartbeat
//!
//! ## Message Flow
//!
//! ```text
//! ledger.record() ──send──► ui
//! vitals.record() ──send (abnormal only)──► ui
//! ui.render() ──broadcast──► ledger, vitals, community
//! community.add_member() ──broadcast──► ui, ledger, vitals
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod runtime;
pub mod subsystems;

pub use config::{ConfigError, ModuleKind, RuntimeConfig};
pub use runtime::{RuntimeError, SwitchboardRuntime};
