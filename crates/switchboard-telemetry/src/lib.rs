//! # Switchboard Telemetry
//!
//! Logging and metrics for Switchboard.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with `EnvFilter`, pretty or JSON output
//! - **Spans**: one span per component, injected at construction
//! - **Metrics**: Prometheus gauges and counters, text exposition
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchboard_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let metrics = init_telemetry(&TelemetryConfig::from_env())?;
//! let bus = MessageBus::with_span(config, component_span("bus"));
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SB_SERVICE_NAME` | `switchboard` | Service name |
//! | `SB_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `SB_JSON_LOGS` | `false` | JSON log output (`true` in containers) |
//! | `SB_THREAD_IDS` | `false` | Include thread ids |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{component_span, init_logging};
pub use metrics::{
    register_metrics, MetricsHandle, BUS_BUDGET_USED_RATIO, BUS_LOG_SIZE, BUS_MESSAGES_ACCEPTED,
    BUS_SUBSCRIBED_SUBSYSTEMS, MODULES_RUNNING, MODULE_HEALTH_CHECKS, REGISTRY,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// # Errors
///
/// Any [`TelemetryError`] from [`init_logging`] or [`register_metrics`].
pub fn init_telemetry(config: &TelemetryConfig) -> Result<MetricsHandle, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;
    Ok(metrics)
}
