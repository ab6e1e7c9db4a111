//! # Vitals Monitor
//!
//! Keeps the latest heart rate and SpO2 reading per patient and raises an
//! alert to `ui` whenever a reading falls outside the thresholds.

use super::ui_renderer::UI_MODULE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{BusError, Envelope, MessageBus, MessageId};
use shared_types::{Capabilities, Module, ModuleError, ModuleHealth};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn, Span};

/// Bus name of the vitals monitor.
pub const VITALS_MODULE: &str = "vitals";

/// Normal ranges. Readings outside them raise an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VitalsThresholds {
    /// Lowest normal heart rate, in bpm.
    pub min_heart_rate: u16,
    /// Highest normal heart rate, in bpm.
    pub max_heart_rate: u16,
    /// Lowest normal oxygen saturation, in percent.
    pub min_spo2: u8,
}

impl Default for VitalsThresholds {
    fn default() -> Self {
        Self {
            min_heart_rate: 50,
            max_heart_rate: 120,
            min_spo2: 92,
        }
    }
}

/// Errors from vitals operations.
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("Vitals monitor is not running")]
    NotRunning,

    #[error("Patient id must not be empty")]
    EmptyPatient,

    #[error("SpO2 must be a percentage, got {0}")]
    InvalidSpo2(u8),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// A reading outside its normal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum Finding {
    Bradycardia { heart_rate: u16 },
    Tachycardia { heart_rate: u16 },
    Hypoxemia { spo2: u8 },
}

/// Latest reading for one patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub patient: String,
    pub heart_rate: u16,
    pub spo2: u8,
    pub recorded_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
    /// Alert envelope sent to `ui`, if the reading was abnormal and the bus
    /// accepted it.
    pub alert: Option<MessageId>,
}

impl Reading {
    pub fn is_abnormal(&self) -> bool {
        !self.findings.is_empty()
    }
}

impl VitalsThresholds {
    /// Findings for a heart rate and SpO2 pair.
    pub fn classify(&self, heart_rate: u16, spo2: u8) -> Vec<Finding> {
        let mut findings = Vec::new();
        if heart_rate < self.min_heart_rate {
            findings.push(Finding::Bradycardia { heart_rate });
        } else if heart_rate > self.max_heart_rate {
            findings.push(Finding::Tachycardia { heart_rate });
        }
        if spo2 < self.min_spo2 {
            findings.push(Finding::Hypoxemia { spo2 });
        }
        findings
    }
}

#[derive(Default)]
struct VitalsState {
    running: bool,
    latest: HashMap<String, Reading>,
    readings: u64,
    alerts: u64,
    received: u64,
}

/// The `vitals` module.
pub struct VitalsMonitor {
    bus: Arc<MessageBus>,
    thresholds: VitalsThresholds,
    state: Arc<Mutex<VitalsState>>,
    subscribed: AtomicBool,
    span: Span,
}

impl VitalsMonitor {
    pub fn new(bus: Arc<MessageBus>, thresholds: VitalsThresholds, span: Span) -> Self {
        Self {
            bus,
            thresholds,
            state: Arc::new(Mutex::new(VitalsState::default())),
            subscribed: AtomicBool::new(false),
            span,
        }
    }

    /// Store a reading and alert `ui` when it is abnormal.
    ///
    /// The reading is stored even when the alert send fails; it then carries
    /// no `alert` id and the bus error is returned. A reading that arrives
    /// after `shutdown` is discarded with `NotRunning`, also when shutdown
    /// lands while the alert is in flight.
    pub fn record(&self, patient: &str, heart_rate: u16, spo2: u8) -> Result<Reading, VitalsError> {
        let _enter = self.span.enter();
        if patient.trim().is_empty() {
            return Err(VitalsError::EmptyPatient);
        }
        if spo2 > 100 {
            return Err(VitalsError::InvalidSpo2(spo2));
        }
        if !self.state.lock().running {
            return Err(VitalsError::NotRunning);
        }

        let mut reading = Reading {
            patient: patient.to_string(),
            heart_rate,
            spo2,
            recorded_at: Utc::now(),
            findings: self.thresholds.classify(heart_rate, spo2),
            alert: None,
        };

        let mut failed = None;
        if reading.is_abnormal() {
            warn!(patient, heart_rate, spo2, findings = ?reading.findings, "Abnormal vitals");
            let sent = self.bus.send(
                VITALS_MODULE,
                UI_MODULE,
                &json!({
                    "event": "vitals_alert",
                    "patient": patient,
                    "findings": reading.findings,
                }),
            );
            match sent {
                Ok(sent) => reading.alert = sent.message_id(),
                Err(err) => failed = Some(err),
            }
        } else {
            debug!(patient, heart_rate, spo2, "Vitals normal");
        }

        let mut state = self.state.lock();
        if !state.running {
            return Err(VitalsError::NotRunning);
        }
        state.readings += 1;
        if reading.alert.is_some() {
            state.alerts += 1;
        }
        state.latest.insert(patient.to_string(), reading.clone());
        drop(state);

        match failed {
            Some(err) => Err(err.into()),
            None => Ok(reading),
        }
    }

    /// Latest reading for `patient`.
    pub fn latest(&self, patient: &str) -> Option<Reading> {
        self.state.lock().latest.get(patient).cloned()
    }

    /// Patients whose latest reading is abnormal, sorted.
    pub fn patients_at_risk(&self) -> Vec<String> {
        let mut patients: Vec<String> = self
            .state
            .lock()
            .latest
            .values()
            .filter(|r| r.is_abnormal())
            .map(|r| r.patient.clone())
            .collect();
        patients.sort();
        patients
    }
}

#[async_trait]
impl Module for VitalsMonitor {
    fn name(&self) -> &str {
        VITALS_MODULE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_shutdown().with_health_check()
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        if self.thresholds.min_heart_rate >= self.thresholds.max_heart_rate {
            return Err(ModuleError::initialization(
                VITALS_MODULE,
                "minHeartRate must be below maxHeartRate",
            ));
        }
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let state = Arc::clone(&self.state);
            self.bus.subscribe(VITALS_MODULE, move |_: &Envelope| {
                state.lock().received += 1;
                Ok(())
            });
        }
        self.state.lock().running = true;
        self.span
            .in_scope(|| info!(thresholds = ?self.thresholds, "Vitals monitor ready"));
        Ok(())
    }

    fn status(&self) -> serde_json::Value {
        let state = self.state.lock();
        json!({
            "running": state.running,
            "patients": state.latest.len(),
            "readings": state.readings,
            "alerts": state.alerts,
            "received": state.received,
            "thresholds": self.thresholds,
        })
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        let mut state = self.state.lock();
        state.running = false;
        self.span
            .in_scope(|| info!(patients = state.latest.len(), "Vitals monitor stopped"));
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        if !self.state.lock().running {
            return ModuleHealth::Unhealthy {
                reason: "vitals monitor is not running".to_string(),
            };
        }
        let at_risk = self.patients_at_risk();
        if at_risk.is_empty() {
            ModuleHealth::Healthy
        } else {
            ModuleHealth::Degraded {
                reason: format!("{} patient(s) with abnormal vitals", at_risk.len()),
            }
        }
    }
}
