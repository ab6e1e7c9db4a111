//! # Module Trait - Capability Contract
//!
//! Defines the contract every collaborating module implements to be driven by
//! the [`ModuleRegistry`](crate::ModuleRegistry).
//!
//! ## Required vs Optional
//!
//! - **Required:** [`Module::name`], [`Module::initialize`], [`Module::status`]
//! - **Optional:** [`Module::shutdown`], [`Module::health_check`]
//!
//! A module advertises its optional operations through
//! [`Module::capabilities`]. The registry reads the capabilities once, at
//! registration, and never calls an operation the module did not advertise.
//!
//! ## Example Implementation
//!
//! ```rust
//! use async_trait::async_trait;
//! use shared_types::{Capabilities, Module, ModuleError, ModuleHealth};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Module for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     async fn initialize(&self) -> Result<(), ModuleError> { Ok(()) }
//!     fn status(&self) -> serde_json::Value { serde_json::json!({"echo": true}) }
//!     fn capabilities(&self) -> Capabilities { Capabilities::none().with_health_check() }
//!     async fn health_check(&self) -> ModuleHealth { ModuleHealth::Healthy }
//! }
//! ```

use crate::errors::ModuleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Optional operations a module supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The module implements [`Module::shutdown`].
    pub shutdown: bool,
    /// The module implements [`Module::health_check`].
    pub health_check: bool,
}

impl Capabilities {
    /// No optional operations.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Advertise [`Module::shutdown`].
    #[must_use]
    pub fn with_shutdown(mut self) -> Self {
        self.shutdown = true;
        self
    }

    /// Advertise [`Module::health_check`].
    #[must_use]
    pub fn with_health_check(mut self) -> Self {
        self.health_check = true;
        self
    }
}

/// Structured health of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "health", rename_all = "snake_case")]
pub enum ModuleHealth {
    /// Running normally.
    Healthy,
    /// Running, but something needs attention.
    Degraded { reason: String },
    /// Not able to do its work.
    Unhealthy { reason: String },
}

impl ModuleHealth {
    /// `true` for [`ModuleHealth::Healthy`] and [`ModuleHealth::Degraded`].
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded { .. } => "degraded",
            Self::Unhealthy { .. } => "unhealthy",
        }
    }
}

impl From<bool> for ModuleHealth {
    fn from(healthy: bool) -> Self {
        if healthy {
            Self::Healthy
        } else {
            Self::Unhealthy {
                reason: "health check returned false".to_string(),
            }
        }
    }
}

/// The contract every module implements.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module name. Also the name the module subscribes under on the bus.
    fn name(&self) -> &str;

    /// Optional operations this module supports. Read once at registration.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    /// Prepare the module for work.
    async fn initialize(&self) -> Result<(), ModuleError>;

    /// Structured, module-specific status.
    fn status(&self) -> serde_json::Value;

    /// Stop the module. Only called when advertised in [`Module::capabilities`].
    async fn shutdown(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Check the module's health. Only called when advertised in
    /// [`Module::capabilities`].
    async fn health_check(&self) -> ModuleHealth {
        ModuleHealth::Healthy
    }
}

/// A shared, type-erased module handle.
pub type DynModule = Arc<dyn Module>;
