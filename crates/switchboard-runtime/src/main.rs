//! # Switchboard
//!
//! Runs the message bus and its modules until Ctrl-C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load configuration (`SB_CONFIG` file, then environment)
//! 3. Build the runtime and start every enabled module
//! 4. Heartbeat on an interval
//! 5. Stop modules in reverse order on Ctrl-C

use anyhow::{Context, Result};
use switchboard_runtime::{RuntimeConfig, SwitchboardRuntime};
use switchboard_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let metrics = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    let runtime = SwitchboardRuntime::new(config, Some(metrics));

    if let Err(e) = runtime.start().await {
        runtime.shutdown().await;
        return Err(e.into());
    }

    info!("Switchboard is running. Press Ctrl+C to stop.");
    let mut heartbeat = tokio::time::interval(runtime.config().heartbeat());
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                runtime.heartbeat().await;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    let failures = runtime.shutdown().await;
    match metrics.gather() {
        Ok(exposition) => debug!("Final metrics:\n{exposition}"),
        Err(e) => debug!(error = %e, "Failed to gather metrics"),
    }
    if !failures.is_empty() {
        anyhow::bail!("{} module(s) failed to stop", failures.len());
    }
    Ok(())
}
