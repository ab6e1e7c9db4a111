//! # Switchboard Runtime
//!
//! Owns the message bus and the module registry.
//!
//! ## Startup Sequence
//!
//! 1. Build the bus from `RuntimeConfig::bus`
//! 2. Build and register the enabled modules (`ui` first, so it is the first
//!    broadcast target)
//! 3. `start()`: initialize every module in registration order
//! 4. `heartbeat()` on an interval: health checks and metrics
//! 5. `shutdown()`: stop modules in reverse order

use crate::config::{ModuleKind, RuntimeConfig};
use crate::subsystems::{CommunityDirectory, ComplianceLedger, UiRenderer, VitalsMonitor};
use serde_json::json;
use shared_bus::MessageBus;
use shared_types::{DynModule, ModuleError, ModuleHealth, ModuleRegistry};
use std::sync::Arc;
use switchboard_telemetry::{component_span, log_event, MetricsHandle};
use thiserror::Error;
use tracing::{error, info};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{} module(s) failed to start: {}", .0.len(), format_failures(.0))]
    StartFailed(Vec<ModuleError>),
}

fn format_failures(failures: &[ModuleError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The runtime orchestrating the bus and its modules.
pub struct SwitchboardRuntime {
    config: RuntimeConfig,
    bus: Arc<MessageBus>,
    registry: ModuleRegistry,
    metrics: Option<MetricsHandle>,
    ui: Option<Arc<UiRenderer>>,
    ledger: Option<Arc<ComplianceLedger>>,
    vitals: Option<Arc<VitalsMonitor>>,
    community: Option<Arc<CommunityDirectory>>,
}

impl SwitchboardRuntime {
    /// Build the bus and register the enabled modules.
    pub fn new(config: RuntimeConfig, metrics: Option<MetricsHandle>) -> Self {
        info!("Creating Switchboard runtime");

        let bus = Arc::new(MessageBus::with_span(
            config.bus.clone(),
            component_span("bus"),
        ));
        let mut runtime = Self {
            bus,
            registry: ModuleRegistry::new(),
            metrics,
            ui: None,
            ledger: None,
            vitals: None,
            community: None,
            config,
        };

        for kind in runtime.config.enabled_modules() {
            let span = component_span(kind.name());
            let bus = Arc::clone(&runtime.bus);
            let module: DynModule = match kind {
                ModuleKind::Ui => {
                    let ui = Arc::new(UiRenderer::new(bus, &runtime.config.ui, span));
                    runtime.ui = Some(Arc::clone(&ui));
                    ui
                }
                ModuleKind::Ledger => {
                    let ledger = Arc::new(ComplianceLedger::new(
                        bus,
                        runtime.config.ledger.clone(),
                        span,
                    ));
                    runtime.ledger = Some(Arc::clone(&ledger));
                    ledger
                }
                ModuleKind::Vitals => {
                    let vitals = Arc::new(VitalsMonitor::new(bus, runtime.config.vitals, span));
                    runtime.vitals = Some(Arc::clone(&vitals));
                    vitals
                }
                ModuleKind::Community => {
                    let community = Arc::new(CommunityDirectory::new(bus, span));
                    runtime.community = Some(Arc::clone(&community));
                    community
                }
            };
            runtime.registry.register(module);
        }

        runtime
    }

    /// Start every registered module.
    ///
    /// # Errors
    ///
    /// `StartFailed` with every module error. Modules that did start keep
    /// running; call [`SwitchboardRuntime::shutdown`] to stop them.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        info!("===========================================");
        info!("  Switchboard Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("  Protocol: {}", self.config.bus.protocol);
        info!("  Modules: {}", self.registry.names().join(", "));
        info!("===========================================");

        let failures = self.registry.start_all().await;
        self.record_metrics();

        if failures.is_empty() {
            info!(
                running = self.registry.running_count(),
                rate_limit = self.config.bus.rate_limit,
                "All modules running"
            );
            Ok(())
        } else {
            for failure in &failures {
                error!(module = %failure.module, error = %failure, "Module failed to start");
            }
            Err(RuntimeError::StartFailed(failures))
        }
    }

    /// Run health checks and refresh metrics.
    pub async fn heartbeat(&self) -> Vec<(String, ModuleHealth)> {
        let results = self.registry.health_check_all().await;

        for (module, health) in &results {
            match health {
                ModuleHealth::Healthy => {}
                ModuleHealth::Degraded { reason } => {
                    log_event!(warn, module.as_str(), "Module degraded", reason = %reason)
                }
                ModuleHealth::Unhealthy { reason } => {
                    log_event!(error, module.as_str(), "Module unhealthy", reason = %reason)
                }
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_health(module, health.label());
            }
        }
        self.record_metrics();

        let status = self.bus.status();
        info!(
            messages_sent = status.messages_sent,
            rate_limit = status.rate_limit,
            subscribers = status.subscribers,
            running = self.registry.running_count(),
            "Heartbeat"
        );
        results
    }

    /// Stop every running module in reverse registration order.
    pub async fn shutdown(&self) -> Vec<ModuleError> {
        info!("Initiating graceful shutdown...");

        let failures = self.registry.stop_all().await;
        for failure in &failures {
            error!(module = %failure.module, error = %failure, "Module failed to stop");
        }
        self.record_metrics();

        info!("Shutdown complete");
        failures
    }

    /// Bus and module status as one JSON document.
    pub fn status(&self) -> serde_json::Value {
        json!({
            "bus": self.bus.status(),
            "modules": self.registry.status_all(),
        })
    }

    fn record_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            let status = self.bus.status();
            metrics.record_bus(
                status.messages_sent,
                status.queue_size,
                status.rate_limit,
                status.subscribers,
            );
            metrics.record_running_modules(self.registry.running_count());
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn ui(&self) -> Option<Arc<UiRenderer>> {
        self.ui.clone()
    }

    pub fn ledger(&self) -> Option<Arc<ComplianceLedger>> {
        self.ledger.clone()
    }

    pub fn vitals(&self) -> Option<Arc<VitalsMonitor>> {
        self.vitals.clone()
    }

    pub fn community(&self) -> Option<Arc<CommunityDirectory>> {
        self.community.clone()
    }
}
