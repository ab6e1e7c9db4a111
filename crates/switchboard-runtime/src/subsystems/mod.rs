//! # Subsystems
//!
//! The modules that talk over the bus. Each one subscribes under its own name
//! during `initialize` and keeps its state in memory.
//!
//! | Module | Bus name | Capabilities |
//! |--------|----------|--------------|
//! | [`UiRenderer`] | `ui` | shutdown |
//! | [`ComplianceLedger`] | `ledger` | shutdown, health check |
//! | [`VitalsMonitor`] | `vitals` | shutdown, health check |
//! | [`CommunityDirectory`] | `community` | shutdown |

pub mod directory;
pub mod ledger;
pub mod ui_renderer;
pub mod vitals;

pub use directory::{CommunityDirectory, DirectoryError, Member, COMMUNITY_MODULE};
pub use ledger::{ComplianceLedger, LedgerConfig, LedgerEntry, LedgerError, LEDGER_MODULE};
pub use ui_renderer::{Notification, UiConfig, UiError, UiRenderer, UI_MODULE};
pub use vitals::{Finding, Reading, VitalsError, VitalsMonitor, VitalsThresholds, VITALS_MODULE};
