//! Client-local dashboard state and its reconciliation rules
//!
//! The sync client is the only writer: push frames go through
//! [`DashboardState::apply`], HTTP snapshots through
//! [`DashboardState::apply_snapshot`]. Both run under one lock acquisition
//! so a reader never sees a half-applied frame.
//!
//! Every push write is stamped with a local sequence number. A snapshot
//! only overwrites entries whose last push write happened before its
//! request started, so a slow HTTP response cannot clobber a newer push
//! update. A full node list pushed after the request started also wins over
//! the snapshot's membership: nodes it removed are not brought back.
//!
//! Per-node sparklines are fed by `node_update` only. The backend follows
//! each `metrics_update` with one `node_update` per node, so recording both
//! would double every sample.

use crate::buffer::RecentBuffer;
use crate::config::SyncConfig;
use crate::history::{ClusterSample, History};
use crate::models::{AiDecision, ClaimMetrics, Node, SecurityEvent};
use crate::protocol::SyncMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug, Clone)]
struct Stamped<T> {
    seq: u64,
    value: T,
}

/// Effect of one push message
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Dropped by the pause gate
    Paused,
    /// Node map replaced or upserted, with the number of nodes written
    Nodes(usize),
    Event(SecurityEvent),
    Decision(AiDecision),
    /// Load moved away from this node
    Highlight(String),
    /// Unknown message kind
    Ignored,
}

/// Captured when a snapshot request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    started_seq: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub nodes_written: usize,
    /// Nodes kept because a push update arrived while the request was in flight
    pub nodes_kept: usize,
    /// Nodes ignored because a newer full list no longer contains them
    pub nodes_discarded: usize,
    pub events_written: usize,
}

#[derive(Debug)]
pub struct DashboardState {
    nodes: HashMap<String, Stamped<Node>>,
    events: RecentBuffer<Stamped<SecurityEvent>>,
    decisions: RecentBuffer<AiDecision>,
    history: History,
    metrics: Option<ClaimMetrics>,
    paused: bool,
    merge_ai_decisions: bool,
    seq: u64,
    /// Seq of the last full node list pushed
    last_replace_seq: u64,
}

impl DashboardState {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            events: RecentBuffer::new(config.event_capacity),
            decisions: RecentBuffer::new(config.decision_capacity),
            history: History::new(config.history_capacity),
            metrics: None,
            paused: false,
            merge_ai_decisions: config.merge_ai_decisions,
            seq: 0,
            last_replace_seq: 0,
        }
    }

    /// Fold one push message into the state
    pub fn apply(&mut self, msg: SyncMessage) -> Applied {
        if self.paused {
            return Applied::Paused;
        }

        match msg {
            SyncMessage::Init { data } | SyncMessage::MetricsUpdate { data } => {
                let seq = self.next_seq();
                self.last_replace_seq = seq;
                let count = data.len();
                self.nodes.clear();
                for node in data {
                    self.nodes.insert(node.id.clone(), Stamped { seq, value: node });
                }
                self.prune_history();
                Applied::Nodes(count)
            }
            SyncMessage::NodeUpdate { data } => {
                let seq = self.next_seq();
                self.history.record_node(&data);
                self.nodes.insert(data.id.clone(), Stamped { seq, value: data });
                Applied::Nodes(1)
            }
            SyncMessage::SecurityEvent { data } => {
                let seq = self.next_seq();
                self.events.push(Stamped { seq, value: data.clone() });
                Applied::Event(data)
            }
            SyncMessage::AiDecision { data } => {
                let seq = self.next_seq();
                if self.merge_ai_decisions {
                    self.events.push(Stamped { seq, value: data.to_event() });
                }
                self.decisions.push(data.clone());
                Applied::Decision(data)
            }
            SyncMessage::LoadRedistributed { data } => Applied::Highlight(data.node_id),
            SyncMessage::Unknown => Applied::Ignored,
        }
    }

    fn prune_history(&mut self) {
        let nodes = &self.nodes;
        self.history.retain(|id| nodes.contains_key(id));
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket { started_seq: self.seq }
    }

    /// Apply an HTTP snapshot. `None` means that part of the fetch failed
    /// and the current data is kept as is.
    pub fn apply_snapshot(
        &mut self,
        ticket: RefreshTicket,
        nodes: Option<Vec<Node>>,
        events: Option<Vec<SecurityEvent>>,
    ) -> SnapshotOutcome {
        let started = ticket.started_seq;
        let mut outcome = SnapshotOutcome::default();

        if let Some(nodes) = nodes {
            let membership_is_stale = self.last_replace_seq > started;
            let mut next: HashMap<String, Stamped<Node>> = self
                .nodes
                .drain()
                .filter(|(_, stamped)| stamped.seq > started)
                .collect();
            for node in nodes {
                if next.contains_key(&node.id) {
                    outcome.nodes_kept += 1;
                } else if membership_is_stale {
                    outcome.nodes_discarded += 1;
                } else {
                    outcome.nodes_written += 1;
                    next.insert(node.id.clone(), Stamped { seq: started, value: node });
                }
            }
            self.nodes = next;
            self.prune_history();
        }

        if let Some(mut events) = events {
            let fresher: Vec<Stamped<SecurityEvent>> =
                self.events.drain().filter(|stamped| stamped.seq > started).collect();
            let mut seen: HashSet<String> = fresher.iter().map(|s| s.value.id.clone()).collect();

            events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let mut merged = fresher;
            for event in events {
                if seen.insert(event.id.clone()) {
                    outcome.events_written += 1;
                    merged.push(Stamped { seq: started, value: event });
                }
            }
            self.events.replace(merged);
            outcome.events_written = outcome.events_written.min(self.events.len());
        }

        outcome
    }

    /// Store freshly polled metrics. A new detection sample is appended to
    /// the cluster detection series and returned.
    pub fn record_metrics(&mut self, metrics: ClaimMetrics) -> Option<f64> {
        let previous_samples = self
            .metrics
            .as_ref()
            .map(|m| m.threat_detection.samples)
            .unwrap_or(0);
        let detection = &metrics.threat_detection;
        let new_detection = if detection.samples > previous_samples {
            detection.last_seconds
        } else {
            None
        };
        if let Some(seconds) = new_detection {
            self.history.record_detection(seconds);
        }
        self.metrics = Some(metrics);
        new_detection
    }

    pub fn sample_cluster(&mut self) -> Option<ClusterSample> {
        let nodes = self.nodes.values().map(|stamped| &stamped.value);
        self.history.sample_cluster(nodes)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Nodes sorted by name
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().map(|s| s.value.clone()).collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id).map(|s| &s.value)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Newest first
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.iter().map(|s| s.value.clone()).collect()
    }

    /// Newest first
    pub fn decisions(&self) -> Vec<AiDecision> {
        self.decisions.to_vec()
    }

    pub fn metrics(&self) -> Option<&ClaimMetrics> {
        self.metrics.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}
