//! Push channel wire protocol
//!
//! Server frames are JSON objects discriminated by `type`. Older backends
//! tag frames with `event` instead; such frames are translated by copying
//! `event` into `type` before decoding. The only client frame is the
//! keep-alive text `ping`, answered with a bare `pong`.

use crate::models::{AiDecision, Node, SecurityEvent};
use serde::Deserialize;
use serde_json::Value;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Canonical server → client message
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Full node list sent right after the channel opens
    Init {
        #[serde(deserialize_with = "crate::models::deserialize_node_list")]
        data: Vec<Node>,
    },
    /// Full node list pushed by the backend after a change
    MetricsUpdate {
        #[serde(deserialize_with = "crate::models::deserialize_node_list")]
        data: Vec<Node>,
    },
    /// Single node upsert
    NodeUpdate { data: Node },
    SecurityEvent { data: SecurityEvent },
    AiDecision { data: AiDecision },
    LoadRedistributed { data: Redistribution },
    /// Any kind this client does not know about
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Redistribution {
    pub node_id: String,
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Init { .. } => "init",
            SyncMessage::MetricsUpdate { .. } => "metrics_update",
            SyncMessage::NodeUpdate { .. } => "node_update",
            SyncMessage::SecurityEvent { .. } => "security_event",
            SyncMessage::AiDecision { .. } => "ai_decision",
            SyncMessage::LoadRedistributed { .. } => "load_redistributed",
            SyncMessage::Unknown => "unknown",
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone)]
pub enum Frame {
    Message(SyncMessage),
    /// Reply to our ping, carries no state
    KeepAlive,
}

/// Decode one text frame
pub fn decode_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let trimmed = text.trim();
    if trimmed == PONG {
        return Ok(Frame::KeepAlive);
    }

    let mut value: Value = serde_json::from_str(trimmed)?;
    if let Value::Object(map) = &mut value {
        if !map.contains_key("type") {
            if let Some(kind) = map.get("event").cloned() {
                map.insert("type".to_string(), kind);
            }
        }
    }
    serde_json::from_value(value).map(Frame::Message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> SyncMessage {
        match decode_frame(&value.to_string()).unwrap() {
            Frame::Message(msg) => msg,
            Frame::KeepAlive => panic!("expected a message"),
        }
    }

    #[test]
    fn test_type_discriminator() {
        let msg = decode(json!({
            "type": "load_redistributed", "data": {"node_id": "n3"}
        }));
        match msg {
            SyncMessage::LoadRedistributed { data } => assert_eq!(data.node_id, "n3"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_event_discriminator_translation() {
        let msg = decode(json!({
            "event": "node_update",
            "data": {"id": "n1", "name": "n1", "ip": "10.0.0.1", "state": "healthy", "cpu": 0.2, "mem": 0.3, "net_in": 1.0, "net_out": 2.0}
        }));
        assert_eq!(msg.kind(), "node_update");
    }

    #[test]
    fn test_both_discriminators_prefers_type() {
        let msg = decode(json!({
            "type": "init", "event": "init",
            "data": [{"id": "n1", "name": "a", "ip": "1.1.1.1", "status": "warning",
                      "metrics": {"cpu": 10.0, "memory": 20.0, "network_in": 0.0, "network_out": 0.0, "latency_ms": 3.0},
                      "last_update": 1.0}]
        }));
        match msg {
            SyncMessage::Init { data } => assert_eq!(data.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_full_list_keeps_valid_nodes() {
        let msg = decode(json!({
            "type": "metrics_update",
            "data": [
                {"id": "n1", "status": "healthy", "metrics": {"cpu": 10.0, "memory": 20.0}},
                {"id": "n2", "status": "on_fire", "metrics": {"cpu": 10.0, "memory": 20.0}}
            ]
        }));
        match msg {
            SyncMessage::MetricsUpdate { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].id, "n1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let msg = decode(json!({"type": "topology_changed", "data": {}}));
        assert!(matches!(msg, SyncMessage::Unknown));
    }

    #[test]
    fn test_pong_and_malformed() {
        assert!(matches!(decode_frame("pong").unwrap(), Frame::KeepAlive));
        assert!(decode_frame("{not json").is_err());
        assert!(decode_frame(r#"{"type":"security_event","data":{"id":"x"}}"#).is_err());
    }
}
