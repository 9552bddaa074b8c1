//! Operator actions
//!
//! Fire-and-forget: each action raises the busy flag, sends one request and
//! lowers the flag whatever the outcome. There is no retry and no queue;
//! concurrent actions are all sent. The resulting state change, if any,
//! arrives later through the push channel.

use crate::backend::{BackendClient, ThreatOptions};
use crate::error::Result;
use crate::signals::{Signals, StatusKind};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub const SUCCESS_MESSAGE: &str = "Action triggered successfully";
pub const FAILURE_MESSAGE: &str = "Action failed. Check backend.";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SimulateThreat(ThreatOptions),
    Quarantine(String),
    Release(String),
    Attack { node_id: String, kind: String },
    Redistribute(String),
    DemoReset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SimulateThreat(_) => "simulate_threat",
            Action::Quarantine(_) => "quarantine",
            Action::Release(_) => "release",
            Action::Attack { .. } => "attack",
            Action::Redistribute(_) => "redistribute",
            Action::DemoReset => "demo_reset",
        }
    }
}

/// Holds the busy flag up until dropped
struct BusyGuard<'a> {
    signals: &'a Signals,
}

impl<'a> BusyGuard<'a> {
    fn raise(signals: &'a Signals) -> Self {
        signals.set_busy(true);
        Self { signals }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signals.set_busy(false);
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    backend: BackendClient,
    signals: Signals,
    status_for: Duration,
}

impl CommandDispatcher {
    pub fn new(backend: BackendClient, signals: Signals, status_for: Duration) -> Self {
        Self {
            backend,
            signals,
            status_for,
        }
    }

    pub async fn dispatch(&self, action: Action) -> Result<Value> {
        let name = action.name();
        self.run(name, async {
            match &action {
                Action::SimulateThreat(options) => self.backend.simulate_threat(options).await,
                Action::Quarantine(node_id) => self.backend.quarantine(node_id).await,
                Action::Release(node_id) => self.backend.release(node_id).await,
                Action::Attack { node_id, kind } => self.backend.attack(node_id, kind).await,
                Action::Redistribute(node_id) => self.backend.redistribute_load(node_id).await,
                Action::DemoReset => self.backend.reset_demo().await,
            }
        })
        .await
    }

    /// Wrap any backend call in the busy flag and status message lifecycle.
    /// The flag is lowered even when the caller drops the future mid-request.
    pub async fn run<T, F>(&self, name: &str, request: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let busy = BusyGuard::raise(&self.signals);
        let result = request.await;
        drop(busy);

        match &result {
            Ok(_) => {
                info!("Action {} sent", name);
                self.signals.flash_status(StatusKind::Success, SUCCESS_MESSAGE, self.status_for);
            }
            Err(e) => {
                warn!("Action {} failed: {}", name, e);
                self.signals.flash_status(StatusKind::Failure, FAILURE_MESSAGE, self.status_for);
            }
        }
        result
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }
}
