//! # Module Registry - Lifecycle Management
//!
//! Registers named modules and drives their lifecycle.
//!
//! ## Features
//!
//! - **Registration order**: modules start in the order they were registered
//!   and stop in reverse.
//! - **Capabilities resolved once**: optional `shutdown`/`health_check` are
//!   looked up at registration and never queried again.
//! - **Graceful degradation**: a failing module is marked `Failed` and the
//!   rest keep starting.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = ModuleRegistry::new();
//! registry.register(Arc::new(UiRenderer::new(bus.clone(), span)));
//! registry.register(Arc::new(ComplianceLedger::new(bus.clone(), config, span)));
//!
//! let failures = registry.start_all().await;
//! // ...
//! registry.stop_all().await;
//! ```

use crate::errors::{ModuleError, ModuleErrorKind};
use crate::module_trait::{Capabilities, DynModule, ModuleHealth};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Lifecycle state of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Registered, never started.
    Registered,
    /// `initialize` succeeded.
    Running,
    /// Stopped by the registry.
    Stopped,
    /// `initialize` or `shutdown` failed.
    Failed,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Entry for a registered module.
struct ModuleEntry {
    name: String,
    module: DynModule,
    capabilities: Capabilities,
    state: Mutex<ModuleState>,
}

impl ModuleEntry {
    fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    fn set_state(&self, state: ModuleState) {
        *self.state.lock() = state;
    }
}

/// Central registry for all modules.
#[derive(Default)]
pub struct ModuleRegistry {
    /// Entries in registration order.
    entries: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module.
    ///
    /// A module with the same name is replaced in place, keeping its position
    /// in the start order.
    pub fn register(&mut self, module: DynModule) {
        let name = module.name().to_string();
        let capabilities = module.capabilities();

        info!(
            module = %name,
            shutdown = capabilities.shutdown,
            health_check = capabilities.health_check,
            "[Registry] Registering module"
        );

        let entry = ModuleEntry {
            name: name.clone(),
            module,
            capabilities,
            state: Mutex::new(ModuleState::Registered),
        };

        match self.entries.iter().position(|e| e.name == name) {
            Some(position) => {
                warn!(module = %name, "[Registry] Module already registered, replacing");
                self.entries[position] = entry;
            }
            None => self.entries.push(entry),
        }
    }

    /// Check if a module is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifecycle state of a module.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.entry(name).map(ModuleEntry::state)
    }

    /// Capabilities recorded at registration.
    #[must_use]
    pub fn capabilities(&self, name: &str) -> Option<Capabilities> {
        self.entry(name).map(|e| e.capabilities)
    }

    /// Number of modules currently running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state() == ModuleState::Running)
            .count()
    }

    /// Initialize one module.
    ///
    /// # Errors
    ///
    /// - `NotRegistered` if `name` is unknown
    /// - `InvalidState` if the module is already running
    /// - the module's own error if `initialize` fails (the module is then `Failed`)
    pub async fn start(&self, name: &str) -> Result<(), ModuleError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ModuleError::not_registered(name))?;
        Self::start_entry(entry).await
    }

    /// Start every module in registration order.
    ///
    /// Keeps going past failures and returns them. Modules already running
    /// are skipped.
    pub async fn start_all(&self) -> Vec<ModuleError> {
        info!("[Registry] Starting {} modules", self.entries.len());

        let mut failures = Vec::new();
        for entry in &self.entries {
            if entry.state() == ModuleState::Running {
                continue;
            }
            if let Err(e) = Self::start_entry(entry).await {
                failures.push(e);
            }
        }

        info!(
            running = self.running_count(),
            failed = failures.len(),
            "[Registry] Start complete"
        );
        failures
    }

    /// Stop one module.
    ///
    /// `shutdown` is only called when the module advertised it.
    ///
    /// # Errors
    ///
    /// - `NotRegistered` if `name` is unknown
    /// - `InvalidState` if the module is not running
    /// - the module's own error if `shutdown` fails (the module is then `Failed`)
    pub async fn stop(&self, name: &str) -> Result<(), ModuleError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ModuleError::not_registered(name))?;
        Self::stop_entry(entry).await
    }

    /// Stop every running module in reverse registration order.
    ///
    /// Returns the shutdown failures; all modules are attempted.
    pub async fn stop_all(&self) -> Vec<ModuleError> {
        info!("[Registry] Stopping all modules");

        let mut failures = Vec::new();
        for entry in self.entries.iter().rev() {
            if entry.state() != ModuleState::Running {
                continue;
            }
            if let Err(e) = Self::stop_entry(entry).await {
                failures.push(e);
            }
        }

        info!("[Registry] All modules stopped");
        failures
    }

    /// Health of one module.
    ///
    /// Calls `health_check` when advertised; otherwise the health is derived
    /// from the lifecycle state (`Running` is healthy).
    pub async fn health_check(&self, name: &str) -> Result<ModuleHealth, ModuleError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ModuleError::not_registered(name))?;
        Ok(Self::check_entry(entry).await)
    }

    /// Health of every module, in registration order.
    pub async fn health_check_all(&self) -> Vec<(String, ModuleHealth)> {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            results.push((entry.name.clone(), Self::check_entry(entry).await));
        }
        results
    }

    /// Status of every module as a JSON object keyed by name.
    ///
    /// ```text
    /// { "<name>": { "state": "running", "capabilities": {...}, "details": <module status> } }
    /// ```
    #[must_use]
    pub fn status_all(&self) -> serde_json::Value {
        let mut statuses = serde_json::Map::new();

        for entry in &self.entries {
            statuses.insert(
                entry.name.clone(),
                serde_json::json!({
                    "state": entry.state(),
                    "capabilities": entry.capabilities,
                    "details": entry.module.status(),
                }),
            );
        }

        serde_json::Value::Object(statuses)
    }

    fn entry(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    async fn start_entry(entry: &ModuleEntry) -> Result<(), ModuleError> {
        if entry.state() == ModuleState::Running {
            return Err(ModuleError::new(
                &entry.name,
                ModuleErrorKind::InvalidState,
                "already running",
            ));
        }

        info!(module = %entry.name, "[Registry] Starting module");
        match entry.module.initialize().await {
            Ok(()) => {
                entry.set_state(ModuleState::Running);
                info!(module = %entry.name, "[Registry] ✓ Module started");
                Ok(())
            }
            Err(e) => {
                entry.set_state(ModuleState::Failed);
                error!(module = %entry.name, error = %e, "[Registry] ✗ Module failed to start");
                Err(e)
            }
        }
    }

    async fn stop_entry(entry: &ModuleEntry) -> Result<(), ModuleError> {
        let state = entry.state();
        if state != ModuleState::Running {
            return Err(ModuleError::new(
                &entry.name,
                ModuleErrorKind::InvalidState,
                format!("cannot stop a module that is {state}"),
            ));
        }

        if !entry.capabilities.shutdown {
            entry.set_state(ModuleState::Stopped);
            info!(module = %entry.name, "[Registry] ✓ Module stopped (no shutdown hook)");
            return Ok(());
        }

        match entry.module.shutdown().await {
            Ok(()) => {
                entry.set_state(ModuleState::Stopped);
                info!(module = %entry.name, "[Registry] ✓ Module stopped");
                Ok(())
            }
            Err(e) => {
                entry.set_state(ModuleState::Failed);
                error!(module = %entry.name, error = %e, "[Registry] ✗ Module failed to stop cleanly");
                Err(e)
            }
        }
    }

    async fn check_entry(entry: &ModuleEntry) -> ModuleHealth {
        if entry.capabilities.health_check {
            return entry.module.health_check().await;
        }
        match entry.state() {
            ModuleState::Running => ModuleHealth::Healthy,
            state => ModuleHealth::Unhealthy {
                reason: format!("module is {state}"),
            },
        }
    }
}
