//! # Runtime Configuration
//!
//! Loaded in two layers:
//!
//! 1. an optional JSON file named by `SB_CONFIG` (camelCase keys, every field
//!    optional);
//! 2. environment overrides.
//!
//! ```json
//! {
//!   "bus": { "protocol": "WebSocket", "rateLimit": 10000, "delivery": "isolate" },
//!   "modules": ["ui", "ledger", "vitals", "community"],
//!   "heartbeatSecs": 10,
//!   "ledger": { "maxAmountCents": 1000000 }
//! }
//! ```

use crate::subsystems::{
    LedgerConfig, UiConfig, VitalsThresholds, COMMUNITY_MODULE, LEDGER_MODULE, UI_MODULE,
    VITALS_MODULE,
};
use serde::{Deserialize, Serialize};
use shared_bus::{BusConfig, InvalidOverride};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown module {0:?} (expected ui, ledger, vitals or community)")]
    UnknownModule(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl From<InvalidOverride> for ConfigError {
    fn from(err: InvalidOverride) -> Self {
        Self::InvalidValue {
            key: err.key,
            value: err.value,
        }
    }
}

/// The modules the runtime knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Ui,
    Ledger,
    Vitals,
    Community,
}

impl ModuleKind {
    /// Every module, in start order.
    pub const ALL: [ModuleKind; 4] = [Self::Ui, Self::Ledger, Self::Vitals, Self::Community];

    /// Bus name of the module.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ui => UI_MODULE,
            Self::Ledger => LEDGER_MODULE,
            Self::Vitals => VITALS_MODULE,
            Self::Community => COMMUNITY_MODULE,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ConfigError::UnknownModule(s.to_string()))
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Message bus settings.
    pub bus: BusConfig,
    /// Enabled modules. Duplicates are ignored.
    pub modules: Vec<ModuleKind>,
    /// Seconds between heartbeats.
    pub heartbeat_secs: u64,
    pub ui: UiConfig,
    pub ledger: LedgerConfig,
    pub vitals: VitalsThresholds,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            modules: ModuleKind::ALL.to_vec(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            ui: UiConfig::default(),
            ledger: LedgerConfig::default(),
            vitals: VitalsThresholds::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `SB_CONFIG` (if set) and the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or an
    /// override names an unknown module or carries an unparseable number.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match env::var("SB_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides()
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply process environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `SB_PROTOCOL`, `SB_ENCRYPTION`, `SB_RATE_LIMIT`, `SB_TIMEOUT_MS`,
    ///   `SB_DELIVERY`: bus settings (see [`BusConfig::with_overrides`])
    /// - `SB_MODULES`: comma-separated module list
    /// - `SB_HEARTBEAT_SECS`: heartbeat interval
    /// - `SB_LEDGER_MAX_AMOUNT`: ledger per-entry ceiling, in cents
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply bus and runtime overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        self.bus = self.bus.with_overrides(&lookup)?;
        if let Some(modules) = lookup("SB_MODULES") {
            self.modules = modules
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(str::parse::<ModuleKind>)
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(value) = lookup("SB_HEARTBEAT_SECS") {
            self.heartbeat_secs = parse_number("SB_HEARTBEAT_SECS", value)?;
        }
        if let Some(value) = lookup("SB_LEDGER_MAX_AMOUNT") {
            self.ledger.max_amount_cents = parse_number("SB_LEDGER_MAX_AMOUNT", value)?;
        }
        Ok(self)
    }

    /// Heartbeat interval. Never zero.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    /// Enabled modules in start order, without duplicates.
    pub fn enabled_modules(&self) -> Vec<ModuleKind> {
        ModuleKind::ALL
            .into_iter()
            .filter(|kind| self.modules.contains(kind))
            .collect()
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse();
    parsed.map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::DeliveryPolicy;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_enable_everything() {
        let config = RuntimeConfig::default();
        assert_eq!(config.enabled_modules(), ModuleKind::ALL.to_vec());
        assert_eq!(config.heartbeat(), Duration::from_secs(10));
        assert_eq!(config.bus.rate_limit, 10_000);
    }

    #[test]
    fn test_partial_json() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"bus": {"rateLimit": 5, "delivery": "propagate"}, "modules": ["ledger", "ui"]}"#,
        )
        .unwrap();
        assert_eq!(config.bus.rate_limit, 5);
        assert_eq!(config.bus.delivery, DeliveryPolicy::Propagate);
        assert_eq!(config.bus.protocol, "WebSocket");
        // Start order is fixed regardless of listing order.
        assert_eq!(
            config.enabled_modules(),
            vec![ModuleKind::Ui, ModuleKind::Ledger]
        );
        assert_eq!(config.heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"heartbeatSecs": 3, "ledger": {{"maxAmountCents": 99}}}}"#).unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.heartbeat_secs, 3);
        assert_eq!(config.ledger.max_amount_cents, 99);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            RuntimeConfig::from_file("/nonexistent/switchboard.json"),
            Err(ConfigError::Read { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            RuntimeConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::default()
            .with_overrides(lookup(&[
                ("SB_MODULES", "vitals, UI"),
                ("SB_HEARTBEAT_SECS", "2"),
                ("SB_LEDGER_MAX_AMOUNT", "500"),
            ]))
            .unwrap();
        assert_eq!(
            config.enabled_modules(),
            vec![ModuleKind::Ui, ModuleKind::Vitals]
        );
        assert_eq!(config.heartbeat_secs, 2);
        assert_eq!(config.ledger.max_amount_cents, 500);
    }

    #[test]
    fn test_override_errors() {
        assert!(matches!(
            RuntimeConfig::default().with_overrides(lookup(&[("SB_MODULES", "ui,billing")])),
            Err(ConfigError::UnknownModule(name)) if name == "billing"
        ));
        assert!(matches!(
            RuntimeConfig::default().with_overrides(lookup(&[("SB_HEARTBEAT_SECS", "soon")])),
            Err(ConfigError::InvalidValue { key: "SB_HEARTBEAT_SECS", .. })
        ));
    }

    #[test]
    fn test_bus_overrides() {
        let config = RuntimeConfig::default()
            .with_overrides(lookup(&[
                ("SB_RATE_LIMIT", "25"),
                ("SB_DELIVERY", "propagate"),
            ]))
            .unwrap();
        assert_eq!(config.bus.rate_limit, 25);
        assert_eq!(config.bus.delivery, DeliveryPolicy::Propagate);
    }

    #[test]
    fn test_malformed_bus_override_fails_load() {
        match RuntimeConfig::default().with_overrides(lookup(&[("SB_RATE_LIMIT", "ten")])) {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "SB_RATE_LIMIT");
                assert_eq!(value, "ten");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
        assert!(matches!(
            RuntimeConfig::default().with_overrides(lookup(&[("SB_DELIVERY", "sometimes")])),
            Err(ConfigError::InvalidValue { key: "SB_DELIVERY", .. })
        ));
    }

    #[test]
    fn test_zero_heartbeat_clamped() {
        let config = RuntimeConfig {
            heartbeat_secs: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.heartbeat(), Duration::from_secs(1));
    }
}
