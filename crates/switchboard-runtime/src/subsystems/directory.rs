//! # Community Directory
//!
//! Member list keyed by handle. Joins are broadcast to every other
//! subsystem; removals are silent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{BroadcastResult, BusError, Envelope, MessageBus};
use shared_types::{Capabilities, Module, ModuleError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, Span};

/// Bus name of the community directory.
pub const COMMUNITY_MODULE: &str = "community";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Community directory is not running")]
    NotRunning,

    #[error("Member handle must not be empty")]
    EmptyHandle,

    #[error("Member {0:?} already exists")]
    DuplicateMember(String),

    #[error("Member {0:?} not found")]
    UnknownMember(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// A directory member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub handle: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// The `community` module.
pub struct CommunityDirectory {
    bus: Arc<MessageBus>,
    members: RwLock<BTreeMap<String, Member>>,
    running: AtomicBool,
    received: Arc<AtomicU64>,
    subscribed: AtomicBool,
    span: Span,
}

impl CommunityDirectory {
    pub fn new(bus: Arc<MessageBus>, span: Span) -> Self {
        Self {
            bus,
            members: RwLock::new(BTreeMap::new()),
            running: AtomicBool::new(false),
            received: Arc::new(AtomicU64::new(0)),
            subscribed: AtomicBool::new(false),
            span,
        }
    }

    /// Add a member and broadcast the join.
    ///
    /// Returns the member and the join broadcast.
    pub fn add_member(
        &self,
        handle: &str,
        display_name: &str,
    ) -> Result<(Member, BroadcastResult), DirectoryError> {
        let _enter = self.span.enter();
        self.ensure_running()?;
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(DirectoryError::EmptyHandle);
        }

        let member = {
            let mut members = self.members.write();
            if members.contains_key(handle) {
                return Err(DirectoryError::DuplicateMember(handle.to_string()));
            }
            let member = Member {
                handle: handle.to_string(),
                display_name: display_name.to_string(),
                joined_at: Utc::now(),
            };
            members.insert(member.handle.clone(), member.clone());
            member
        };

        let joined = self.bus.broadcast(
            COMMUNITY_MODULE,
            &json!({"event": "member_joined", "handle": member.handle}),
        )?;
        info!(handle, recipients = joined.recipients, "Member joined");
        Ok((member, joined))
    }

    /// Remove a member.
    pub fn remove_member(&self, handle: &str) -> Result<Member, DirectoryError> {
        let _enter = self.span.enter();
        self.ensure_running()?;
        let removed = self
            .members
            .write()
            .remove(handle)
            .ok_or_else(|| DirectoryError::UnknownMember(handle.to_string()))?;
        debug!(handle, "Member removed");
        Ok(removed)
    }

    pub fn find(&self, handle: &str) -> Option<Member> {
        self.members.read().get(handle).cloned()
    }

    /// All members, sorted by handle.
    pub fn members(&self) -> Vec<Member> {
        self.members.read().values().cloned().collect()
    }

    fn ensure_running(&self) -> Result<(), DirectoryError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::NotRunning)
        }
    }
}

#[async_trait]
impl Module for CommunityDirectory {
    fn name(&self) -> &str {
        COMMUNITY_MODULE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_shutdown()
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let received = Arc::clone(&self.received);
            self.bus.subscribe(COMMUNITY_MODULE, move |_: &Envelope| {
                received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }
        self.running.store(true, Ordering::SeqCst);
        self.span.in_scope(|| info!("Community directory ready"));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        self.running.store(false, Ordering::SeqCst);
        self.span.in_scope(|| {
            info!(members = self.members.read().len(), "Community directory closed")
        });
        Ok(())
    }

    fn status(&self) -> serde_json::Value {
        json!({
            "running": self.running.load(Ordering::SeqCst),
            "members": self.members.read().len(),
            "received": self.received.load(Ordering::Relaxed),
        })
    }
}
