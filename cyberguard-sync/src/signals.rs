//! Observable client status for whatever renders the dashboard
//!
//! Every signal is a `tokio::sync::watch` channel: readers get the latest
//! value and can await changes, writers never block. Transient signals
//! (highlight, status message) revert on their own after a fixed duration;
//! a newer pulse supersedes an older one's revert.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_online(self) -> bool {
        self == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Success,
    Failure,
}

/// Short-lived feedback for an operator action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

/// Raised for high and critical events when alerting is on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub event_id: String,
    pub node_id: String,
    pub severity: crate::models::Severity,
}

struct Inner {
    connection: watch::Sender<ConnectionState>,
    busy: watch::Sender<bool>,
    highlight: watch::Sender<Option<String>>,
    highlight_gen: AtomicU64,
    status: watch::Sender<Option<StatusMessage>>,
    status_gen: AtomicU64,
    load_error: watch::Sender<Option<String>>,
    revision: watch::Sender<u64>,
    alert: watch::Sender<Option<Alert>>,
}

#[derive(Clone)]
pub struct Signals {
    inner: Arc<Inner>,
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                connection: watch::Sender::new(ConnectionState::Disconnected),
                busy: watch::Sender::new(false),
                highlight: watch::Sender::new(None),
                highlight_gen: AtomicU64::new(0),
                status: watch::Sender::new(None),
                status_gen: AtomicU64::new(0),
                load_error: watch::Sender::new(None),
                revision: watch::Sender::new(0),
                alert: watch::Sender::new(None),
            }),
        }
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.inner.connection.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    pub fn connection(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    pub fn set_busy(&self, busy: bool) {
        self.inner.busy.send_replace(busy);
    }

    pub fn is_busy(&self) -> bool {
        *self.inner.busy.borrow()
    }

    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Mark `node_id` for `duration`, then clear it unless a newer
    /// highlight replaced it in the meantime
    pub fn pulse_highlight(&self, node_id: String, duration: Duration) {
        let generation = self.inner.highlight_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.highlight.send_replace(Some(node_id));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if inner.highlight_gen.load(Ordering::SeqCst) == generation {
                inner.highlight.send_replace(None);
            }
        });
    }

    pub fn highlight(&self) -> Option<String> {
        self.inner.highlight.borrow().clone()
    }

    pub fn watch_highlight(&self) -> watch::Receiver<Option<String>> {
        self.inner.highlight.subscribe()
    }

    /// Show `text` for `duration`
    pub fn flash_status(&self, kind: StatusKind, text: impl Into<String>, duration: Duration) {
        let generation = self.inner.status_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.status.send_replace(Some(StatusMessage {
            kind,
            text: text.into(),
        }));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if inner.status_gen.load(Ordering::SeqCst) == generation {
                inner.status.send_replace(None);
            }
        });
    }

    pub fn status(&self) -> Option<StatusMessage> {
        self.inner.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.inner.status.subscribe()
    }

    pub fn set_load_error(&self, error: Option<String>) {
        self.inner.load_error.send_replace(error);
    }

    pub fn load_error(&self) -> Option<String> {
        self.inner.load_error.borrow().clone()
    }

    pub fn watch_load_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.load_error.subscribe()
    }

    /// Bumped after every state change a renderer should pick up
    pub fn bump_revision(&self) {
        self.inner.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn raise_alert(&self, alert: Alert) {
        self.inner.alert.send_replace(Some(alert));
    }

    pub fn watch_alert(&self) -> watch::Receiver<Option<Alert>> {
        self.inner.alert.subscribe()
    }
}
