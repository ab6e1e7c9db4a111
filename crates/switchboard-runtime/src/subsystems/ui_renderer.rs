//! # UI Renderer
//!
//! Renders named components and keeps a bounded feed of the envelopes other
//! modules address to `ui`.
//!
//! ```text
//! render("dashboard") ──broadcast {"event":"rendered"}──► every other subsystem
//! ledger / vitals ──send──► ui handler ──► feed (latest N, oldest dropped)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{
    BroadcastResult, BusError, DeliveryError, DeliveryResult, Envelope, Fingerprint, MessageBus,
    MessageId,
};
use shared_types::{Capabilities, Module, ModuleError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, Span};

/// Bus name of the UI renderer.
pub const UI_MODULE: &str = "ui";

/// Default number of notifications kept in the feed.
pub const DEFAULT_FEED_CAPACITY: usize = 50;

/// UI renderer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiConfig {
    /// Notifications kept before the oldest is dropped.
    pub feed_capacity: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

/// Errors from UI operations.
#[derive(Debug, Error)]
pub enum UiError {
    #[error("UI renderer is not running")]
    NotRunning,

    #[error("Component name must not be empty")]
    EmptyComponent,

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// One envelope received by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message_id: MessageId,
    pub sender: String,
    pub payload_fingerprint: Fingerprint,
    pub received_at: DateTime<Utc>,
}

impl From<&Envelope> for Notification {
    fn from(envelope: &Envelope) -> Self {
        Self {
            message_id: envelope.id,
            sender: envelope.sender.clone(),
            payload_fingerprint: envelope.payload_fingerprint,
            received_at: Utc::now(),
        }
    }
}

struct UiState {
    running: bool,
    components: Vec<String>,
    feed: VecDeque<Notification>,
    capacity: usize,
    received: u64,
}

impl UiState {
    fn receive(&mut self, envelope: &Envelope) -> DeliveryResult {
        if !self.running {
            return Err(DeliveryError::new("ui renderer is not running"));
        }
        self.received += 1;
        self.feed.push_back(Notification::from(envelope));
        while self.feed.len() > self.capacity {
            self.feed.pop_front();
        }
        Ok(())
    }
}

/// The `ui` module.
pub struct UiRenderer {
    bus: Arc<MessageBus>,
    state: Arc<Mutex<UiState>>,
    subscribed: AtomicBool,
    span: Span,
}

impl UiRenderer {
    pub fn new(bus: Arc<MessageBus>, config: &UiConfig, span: Span) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(UiState {
                running: false,
                components: Vec::new(),
                feed: VecDeque::with_capacity(config.feed_capacity),
                capacity: config.feed_capacity,
                received: 0,
            })),
            subscribed: AtomicBool::new(false),
            span,
        }
    }

    /// Render `component` and announce it to every other subsystem.
    pub fn render(&self, component: &str) -> Result<BroadcastResult, UiError> {
        let _enter = self.span.enter();
        if component.trim().is_empty() {
            return Err(UiError::EmptyComponent);
        }
        {
            let mut state = self.state.lock();
            if !state.running {
                return Err(UiError::NotRunning);
            }
            state.components.push(component.to_string());
        }

        let result = self.bus.broadcast(
            UI_MODULE,
            &json!({"event": "rendered", "component": component}),
        )?;
        debug!(
            component,
            recipients = result.recipients,
            accepted = result.accepted(),
            "Component rendered"
        );
        Ok(result)
    }

    /// Feed snapshot, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().feed.iter().cloned().collect()
    }

    /// Rendered components, in render order.
    pub fn components(&self) -> Vec<String> {
        self.state.lock().components.clone()
    }
}

#[async_trait]
impl Module for UiRenderer {
    fn name(&self) -> &str {
        UI_MODULE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_shutdown()
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let state = Arc::clone(&self.state);
            self.bus
                .subscribe(UI_MODULE, move |envelope: &Envelope| {
                    state.lock().receive(envelope)
                });
        }
        self.state.lock().running = true;
        self.span.in_scope(|| info!("UI renderer ready"));
        Ok(())
    }

    fn status(&self) -> serde_json::Value {
        let state = self.state.lock();
        json!({
            "running": state.running,
            "components": state.components.len(),
            "notifications": state.feed.len(),
            "feedCapacity": state.capacity,
            "received": state.received,
        })
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        self.state.lock().running = false;
        self.span.in_scope(|| info!("UI renderer stopped"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::BusConfig;

    fn renderer(capacity: usize) -> (Arc<MessageBus>, UiRenderer) {
        let bus = Arc::new(MessageBus::new(BusConfig::default()));
        let ui = UiRenderer::new(
            Arc::clone(&bus),
            &UiConfig {
                feed_capacity: capacity,
            },
            Span::none(),
        );
        (bus, ui)
    }

    #[tokio::test]
    async fn test_render_requires_running() {
        let (_bus, ui) = renderer(4);
        assert!(matches!(ui.render("dashboard"), Err(UiError::NotRunning)));

        ui.initialize().await.unwrap();
        assert!(ui.render("dashboard").is_ok());
        assert_eq!(ui.components(), vec!["dashboard".to_string()]);
    }

    #[tokio::test]
    async fn test_render_rejects_empty_component() {
        let (_bus, ui) = renderer(4);
        ui.initialize().await.unwrap();
        assert!(matches!(ui.render("  "), Err(UiError::EmptyComponent)));
    }

    #[tokio::test]
    async fn test_render_broadcasts_to_others() {
        let (bus, ui) = renderer(4);
        ui.initialize().await.unwrap();
        bus.subscribe("ledger", |_: &Envelope| Ok(()));
        bus.subscribe("vitals", |_: &Envelope| Ok(()));

        let result = ui.render("dashboard").unwrap();
        assert_eq!(result.recipients, 2);
        assert!(bus.envelopes().iter().all(|e| e.sender == UI_MODULE));
    }

    #[tokio::test]
    async fn test_feed_keeps_latest() {
        let (bus, ui) = renderer(3);
        ui.initialize().await.unwrap();

        for _ in 0..5 {
            bus.send("ledger", UI_MODULE, &json!({"entry": 1})).unwrap();
        }

        let feed = ui.notifications();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].message_id, "msg_3");
        assert_eq!(feed[2].message_id, "msg_5");
        assert_eq!(ui.status()["received"], 5);
    }

    #[tokio::test]
    async fn test_initialize_twice_subscribes_once() {
        let (bus, ui) = renderer(3);
        ui.initialize().await.unwrap();
        ui.initialize().await.unwrap();
        assert_eq!(bus.subscriber_count(UI_MODULE), 1);
    }

    #[tokio::test]
    async fn test_stopped_renderer_fails_delivery() {
        let (bus, ui) = renderer(3);
        ui.initialize().await.unwrap();
        ui.shutdown().await.unwrap();

        let result = bus.send("ledger", UI_MODULE, &json!({})).unwrap();
        assert!(result.is_success());
        assert!(!result.deliveries()[0].is_delivered());
        assert!(ui.notifications().is_empty());
    }
}
