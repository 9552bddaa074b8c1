//! Domain model of the dashboard: nodes, security events, AI decisions and
//! the aggregate metrics served by the backend.
//!
//! The backend speaks two node vocabularies. Both are accepted on the wire
//! and normalized into [`Node`]:
//! - flat (`/api/nodes`, `node_update`): `state`, `cpu`/`mem` as fractions,
//!   `net_in`/`net_out`, `quarantined` flag
//! - nested (`init`, `metrics_update`): `status` in the
//!   `healthy|warning|critical|offline` vocabulary, `metrics.*` in percent,
//!   `last_update` in unix seconds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical node health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Quarantined,
    Attacked,
}

impl NodeHealth {
    /// Parse either vocabulary. `warning` maps to degraded, `critical` to
    /// attacked and `offline` to quarantined.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "healthy" => Some(NodeHealth::Healthy),
            "degraded" | "warning" => Some(NodeHealth::Degraded),
            "attacked" | "critical" => Some(NodeHealth::Attacked),
            "quarantined" | "offline" => Some(NodeHealth::Quarantined),
            _ => None,
        }
    }

    /// Sort weight used by status ordering: most urgent first
    pub fn urgency(self) -> u8 {
        match self {
            NodeHealth::Quarantined => 0,
            NodeHealth::Attacked => 1,
            NodeHealth::Degraded => 2,
            NodeHealth::Healthy => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeHealth::Healthy => "healthy",
            NodeHealth::Degraded => "degraded",
            NodeHealth::Quarantined => "quarantined",
            NodeHealth::Attacked => "attacked",
        }
    }
}

/// Resource metrics. `cpu` and `memory` are fractions in 0..=1, network
/// figures are kbps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeWire")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub health: NodeHealth,
    pub metrics: NodeMetrics,
    pub last_update: DateTime<Utc>,
}

impl Node {
    pub fn cpu_percent(&self) -> f64 {
        to_percent(self.metrics.cpu)
    }

    pub fn memory_percent(&self) -> f64 {
        to_percent(self.metrics.memory)
    }

    /// Inbound + outbound throughput
    pub fn network_total(&self) -> f64 {
        (self.metrics.network_in + self.metrics.network_out).max(0.0)
    }
}

fn to_percent(fraction: f64) -> f64 {
    (fraction * 100.0).round().clamp(0.0, 100.0)
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

pub(crate) fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

/// Node as it appears on the wire, in either shape
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NodeWire {
    Nested(NestedNode),
    Flat(FlatNode),
}

#[derive(Debug, Deserialize)]
pub struct NestedNode {
    pub id: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub status: Option<String>,
    pub metrics: NestedMetrics,
    pub last_update: Option<f64>,
}

/// Percent-based metrics of the nested shape
#[derive(Debug, Deserialize)]
pub struct NestedMetrics {
    pub cpu: f64,
    pub memory: f64,
    #[serde(default)]
    pub network_in: f64,
    #[serde(default)]
    pub network_out: f64,
    #[serde(default)]
    pub latency_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct FlatNode {
    pub id: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub state: Option<String>,
    pub cpu: f64,
    pub mem: f64,
    #[serde(default)]
    pub net_in: f64,
    #[serde(default)]
    pub net_out: f64,
    #[serde(default)]
    pub quarantined: bool,
    pub last_update: Option<f64>,
}

fn parse_health(value: Option<String>) -> Result<NodeHealth, String> {
    match value {
        None => Ok(NodeHealth::Healthy),
        Some(s) => NodeHealth::parse(&s).ok_or_else(|| format!("unknown node state '{s}'")),
    }
}

impl TryFrom<NodeWire> for Node {
    type Error = String;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        match wire {
            NodeWire::Nested(n) => Ok(Node {
                name: n.name.unwrap_or_else(|| n.id.clone()),
                health: parse_health(n.status)?,
                metrics: NodeMetrics {
                    cpu: clamp_fraction(n.metrics.cpu / 100.0),
                    memory: clamp_fraction(n.metrics.memory / 100.0),
                    network_in: non_negative(n.metrics.network_in),
                    network_out: non_negative(n.metrics.network_out),
                    latency_ms: non_negative(n.metrics.latency_ms),
                },
                last_update: n.last_update.and_then(from_unix_seconds).unwrap_or_else(Utc::now),
                address: n.ip,
                id: n.id,
            }),
            NodeWire::Flat(n) => {
                let health = if n.quarantined {
                    NodeHealth::Quarantined
                } else {
                    parse_health(n.state)?
                };
                Ok(Node {
                    name: n.name.unwrap_or_else(|| n.id.clone()),
                    health,
                    metrics: NodeMetrics {
                        cpu: clamp_fraction(n.cpu),
                        memory: clamp_fraction(n.mem),
                        network_in: non_negative(n.net_in),
                        network_out: non_negative(n.net_out),
                        latency_ms: 0.0,
                    },
                    last_update: n.last_update.and_then(from_unix_seconds).unwrap_or_else(Utc::now),
                    address: n.ip,
                    id: n.id,
                })
            }
        }
    }
}

/// Decode a node list, skipping entries that are not a valid node
/// instead of failing the whole list
pub fn deserialize_node_list<'de, D>(deserializer: D) -> Result<Vec<Node>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Node>(value) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::debug!("Skipping invalid node: {}", e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SecurityEventWire")]
pub struct SecurityEvent {
    pub id: String,
    pub node_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Events carry either `timestamp` (unix seconds) or `created_at` (RFC 3339)
#[derive(Debug, Deserialize)]
pub struct SecurityEventWire {
    pub id: Option<String>,
    pub node_id: String,
    #[serde(rename = "type", default = "default_event_kind")]
    pub kind: String,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    pub timestamp: Option<f64>,
    pub created_at: Option<String>,
}

fn default_event_kind() -> String {
    "unknown".to_string()
}

impl From<SecurityEventWire> for SecurityEvent {
    fn from(wire: SecurityEventWire) -> Self {
        let timestamp = wire
            .timestamp
            .and_then(from_unix_seconds)
            .or_else(|| {
                wire.created_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now);
        SecurityEvent {
            id: wire
                .id
                .unwrap_or_else(|| format!("evt-{}", timestamp.timestamp_millis())),
            node_id: wire.node_id,
            kind: wire.kind,
            severity: wire.severity,
            message: wire.message,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AiDecisionWire")]
pub struct AiDecision {
    pub node_id: String,
    pub severity: Severity,
    pub anomalies: Vec<String>,
    pub actions: Vec<String>,
    pub reasoning: String,
    /// 0..=1
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AiDecisionWire {
    pub node_id: String,
    pub severity: Severity,
    #[serde(default)]
    pub anomalies: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub timestamp: Option<f64>,
}

impl From<AiDecisionWire> for AiDecision {
    fn from(wire: AiDecisionWire) -> Self {
        AiDecision {
            node_id: wire.node_id,
            severity: wire.severity,
            anomalies: wire.anomalies,
            actions: wire.actions,
            reasoning: wire.reasoning,
            confidence: clamp_fraction(wire.confidence.unwrap_or(0.9)),
            timestamp: wire.timestamp.and_then(from_unix_seconds).unwrap_or_else(Utc::now),
        }
    }
}

impl AiDecision {
    /// Feed entry shown interleaved with raw events
    pub fn to_event(&self) -> SecurityEvent {
        SecurityEvent {
            id: format!("ai-{}-{}", self.node_id, self.timestamp.timestamp_millis()),
            node_id: self.node_id.clone(),
            kind: "ai_decision".to_string(),
            severity: self.severity,
            message: self.reasoning.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Aggregate metrics (`/api/metrics`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMetrics {
    pub uptime: f64,
    pub uptime_percent: f64,
    pub downtime_events: u64,
    pub workflow_exec_ms: Improvement,
    pub error_rate_per_hour: Reduction,
    pub threat_detection: ThreatDetection,
    pub incidents_active: u64,
    pub thread_aware_resilience: bool,
    pub thread_efficiency: f64,
    pub autonomous_success_rate: f64,
    pub health_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Improvement {
    pub baseline: f64,
    pub optimized: f64,
    pub improvement_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reduction {
    pub baseline: f64,
    pub optimized: f64,
    pub reduction_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatDetection {
    pub avg_seconds: Option<f64>,
    pub samples: u64,
    pub claim_target_seconds: f64,
    pub last_seconds: Option<f64>,
    pub history: Vec<f64>,
}

impl ThreatDetection {
    /// `None` until a detection has been measured
    pub fn passed(&self) -> Option<bool> {
        self.last_seconds.map(|last| last <= self.claim_target_seconds)
    }
}

/// Backend `/health` payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendHealth {
    pub status: String,
    pub services: HashMap<String, bool>,
    pub nodes: usize,
    pub uptime: f64,
}

impl BackendHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
