//! Prometheus metrics for Switchboard.
//!
//! All metrics follow the naming convention: `sb_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Envelopes accepted since the bus was last initialized
    pub static ref BUS_MESSAGES_ACCEPTED: IntGauge = IntGauge::new(
        "sb_bus_messages_accepted",
        "Envelopes accepted since the bus was last initialized"
    ).expect("metric creation failed");

    /// Envelopes currently held in the bus log
    pub static ref BUS_LOG_SIZE: IntGauge = IntGauge::new(
        "sb_bus_log_size",
        "Envelopes currently held in the bus log"
    ).expect("metric creation failed");

    /// Fraction of the send budget already used
    pub static ref BUS_BUDGET_USED_RATIO: Gauge = Gauge::new(
        "sb_bus_budget_used_ratio",
        "Fraction of the send budget already used"
    ).expect("metric creation failed");

    /// Distinct subsystems with at least one subscription
    pub static ref BUS_SUBSCRIBED_SUBSYSTEMS: IntGauge = IntGauge::new(
        "sb_bus_subscribed_subsystems",
        "Distinct subsystems with at least one subscription"
    ).expect("metric creation failed");

    // =========================================================================
    // MODULE METRICS
    // =========================================================================

    /// Modules currently running
    pub static ref MODULES_RUNNING: IntGauge = IntGauge::new(
        "sb_modules_running",
        "Modules currently running"
    ).expect("metric creation failed");

    /// Health check outcomes by module
    pub static ref MODULE_HEALTH_CHECKS: IntCounterVec = IntCounterVec::new(
        Opts::new("sb_module_health_checks_total", "Health check outcomes by module"),
        &["module", "health"]  // health: healthy/degraded/unhealthy
    ).expect("metric creation failed");
}

/// Handle returned by [`register_metrics`].
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

impl MetricsHandle {
    /// Render every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }

    /// Record a bus status snapshot.
    pub fn record_bus(&self, accepted: u64, log_size: usize, rate_limit: u64, subscribed: usize) {
        BUS_MESSAGES_ACCEPTED.set(saturating_i64(accepted));
        BUS_LOG_SIZE.set(saturating_i64(log_size as u64));
        BUS_SUBSCRIBED_SUBSYSTEMS.set(saturating_i64(subscribed as u64));
        let ratio = if rate_limit == 0 {
            1.0
        } else {
            accepted as f64 / rate_limit as f64
        };
        BUS_BUDGET_USED_RATIO.set(ratio);
    }

    /// Record the number of running modules.
    pub fn record_running_modules(&self, running: usize) {
        MODULES_RUNNING.set(saturating_i64(running as u64));
    }

    /// Count one health check outcome.
    pub fn record_health(&self, module: &str, health: &str) {
        MODULE_HEALTH_CHECKS.with_label_values(&[module, health]).inc();
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless: metrics that are already registered are
/// left in place.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BUS_MESSAGES_ACCEPTED.clone()),
        Box::new(BUS_LOG_SIZE.clone()),
        Box::new(BUS_BUDGET_USED_RATIO.clone()),
        Box::new(BUS_SUBSCRIBED_SUBSYSTEMS.clone()),
        Box::new(MODULES_RUNNING.clone()),
        Box::new(MODULE_HEALTH_CHECKS.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}
