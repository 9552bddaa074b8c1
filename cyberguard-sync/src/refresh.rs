//! Full refresh over HTTP
//!
//! Used for the initial load, for operator-triggered refreshes and for the
//! periodic background refresh. Push updates that land while a request is in
//! flight win over the snapshot, see [`DashboardState::apply_snapshot`].

use crate::backend::BackendClient;
use crate::shutdown::ShutdownListener;
use crate::signals::Signals;
use crate::store::{DashboardState, Shared, SnapshotOutcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const NODES_LOAD_ERROR: &str = "Failed to load nodes";
pub const EVENTS_LOAD_ERROR: &str = "Failed to load events";
pub const REFRESH_ERROR: &str = "Failed to refresh data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Initial,
    Manual,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub outcome: SnapshotOutcome,
    pub nodes_ok: bool,
    pub events_ok: bool,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.nodes_ok && self.events_ok
    }
}

#[derive(Clone)]
pub struct Refresher {
    backend: BackendClient,
    state: Shared<DashboardState>,
    signals: Signals,
}

impl Refresher {
    pub fn new(backend: BackendClient, state: Shared<DashboardState>, signals: Signals) -> Self {
        Self { backend, state, signals }
    }

    /// Fetch nodes and events concurrently and merge what came back
    pub async fn refresh(&self, kind: RefreshKind) -> RefreshReport {
        let ticket = self.state.lock().begin_refresh();
        let (nodes, events) = tokio::join!(self.backend.list_nodes(), self.backend.list_events());

        let nodes = nodes
            .map_err(|e| warn!("{:?} refresh: nodes request failed: {}", kind, e))
            .ok();
        let events = events
            .map_err(|e| warn!("{:?} refresh: events request failed: {}", kind, e))
            .ok();
        let nodes_ok = nodes.is_some();
        let events_ok = events.is_some();

        let outcome = self.state.lock().apply_snapshot(ticket, nodes, events);
        debug!("{:?} refresh applied: {:?}", kind, outcome);
        if nodes_ok || events_ok {
            self.signals.bump_revision();
        }

        match kind {
            RefreshKind::Initial => {
                if !nodes_ok {
                    self.signals.set_load_error(Some(NODES_LOAD_ERROR.to_string()));
                } else if !events_ok {
                    self.signals.set_load_error(Some(EVENTS_LOAD_ERROR.to_string()));
                }
            }
            RefreshKind::Manual => {
                if nodes_ok && events_ok {
                    self.signals.set_load_error(None);
                } else {
                    self.signals.set_load_error(Some(REFRESH_ERROR.to_string()));
                }
            }
            RefreshKind::Periodic => {}
        }

        RefreshReport {
            outcome,
            nodes_ok,
            events_ok,
        }
    }

    /// Background refresh every `every`. Ticks are skipped while paused; a
    /// request still in flight at teardown is dropped.
    pub fn spawn_periodic(&self, every: Duration, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Periodic refresh every {:?}", every);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {}
                }
                if refresher.state.lock().is_paused() {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = refresher.refresh(RefreshKind::Periodic) => {}
                }
            }
            debug!("Periodic refresh stopped");
        })
    }
}
