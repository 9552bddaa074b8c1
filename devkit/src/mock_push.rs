/*!
Mock du canal push pour tester le client sans serveur WebSocket

`MockConnector` implémente `Connector`: chaque tentative de connexion est
enregistrée, peut être refusée, et ouvre une session dont le test contrôle
les deux extrémités (frames poussées vers le client, frames envoyées par le
client).
*/

use cyberguard_sync::{Channel, Connector, SyncError};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct MockSession {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct MockState {
    attempts: Vec<String>,
    refuse: bool,
    sessions: Vec<MockSession>,
    sent: Vec<String>,
}

/// Mock Connector qui simule le transport WebSocket
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les prochaines tentatives échouent tant que `refuse` vaut true
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Nombre de tentatives de connexion, réussies ou non
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Pousse une frame texte brute sur la dernière session ouverte
    pub fn push_frame(&self, text: &str) -> bool {
        let state = self.state.lock().unwrap();
        let sent = state
            .sessions
            .last()
            .and_then(|s| s.to_client.as_ref())
            .map(|tx| tx.send(text.to_string()).is_ok())
            .unwrap_or(false);
        if sent {
            log::info!("📨 [MOCK] Pushed frame: {} bytes", text.len());
        }
        sent
    }

    pub fn push_json(&self, frame: &Value) -> bool {
        self.push_frame(&frame.to_string())
    }

    /// Ferme la dernière session côté serveur
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.last_mut() {
            session.to_client = None;
            log::info!("🔌 [MOCK] Session closed by server");
        }
    }

    /// True tant que le client lit encore la dernière session
    pub fn client_attached(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .last()
            .and_then(|s| s.to_client.as_ref())
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Frames envoyées par le client, toutes sessions confondues
    pub fn sent_frames(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let mut drained = Vec::new();
        for session in state.sessions.iter_mut() {
            while let Ok(frame) = session.from_client.try_recv() {
                drained.push(frame);
            }
        }
        state.sent.extend(drained);
        state.sent.clone()
    }

    /// Attend que `count` tentatives aient eu lieu
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.connect_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.connect_count() >= count
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, cyberguard_sync::Result<Channel>> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(url.to_string());

        if state.refuse {
            log::info!("🚫 [MOCK] Refused connection to {}", url);
            return Box::pin(async { Err(SyncError::Transport("connection refused".into())) });
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        state.sessions.push(MockSession {
            to_client: Some(in_tx),
            from_client: out_rx,
        });
        log::info!("🔗 [MOCK] Session #{} opened on {}", state.sessions.len(), url);

        Box::pin(async move {
            Ok(Channel {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// Helper pour créer des frames au format du backend
pub struct SyncMessageBuilder;

impl SyncMessageBuilder {
    /// Noeud au format plat (`/api/nodes`, `node_update`)
    pub fn flat_node(id: &str, cpu: f64, state: &str) -> Value {
        serde_json::json!({
            "id": id,
            "name": format!("node-{id}"),
            "ip": "10.0.0.10",
            "state": state,
            "cpu": cpu,
            "mem": 0.4,
            "net_in": 120.0,
            "net_out": 30.0,
            "load": cpu,
            "quarantined": state == "quarantined"
        })
    }

    /// Noeud au format imbriqué (`init`, `metrics_update`), métriques en %
    pub fn nested_node(id: &str, cpu_percent: f64, status: &str) -> Value {
        serde_json::json!({
            "id": id,
            "name": format!("node-{id}"),
            "ip": "10.0.0.20",
            "status": status,
            "metrics": {
                "cpu": cpu_percent,
                "memory": 35.0,
                "network_in": 200.0,
                "network_out": 50.0,
                "latency_ms": 4.0
            },
            "last_update": chrono::Utc::now().timestamp() as f64
        })
    }

    pub fn init(nodes: Vec<Value>) -> Value {
        serde_json::json!({"type": "init", "data": nodes})
    }

    pub fn metrics_update(nodes: Vec<Value>) -> Value {
        serde_json::json!({"type": "metrics_update", "data": nodes})
    }

    pub fn node_update(id: &str, cpu: f64) -> Value {
        serde_json::json!({"type": "node_update", "data": Self::flat_node(id, cpu, "healthy")})
    }

    pub fn security_event(id: &str, node_id: &str, severity: &str) -> Value {
        serde_json::json!({
            "type": "security_event",
            "data": Self::event(id, node_id, severity)
        })
    }

    /// Evénement tel que servi par `/api/events`
    pub fn event(id: &str, node_id: &str, severity: &str) -> Value {
        serde_json::json!({
            "id": id,
            "node_id": node_id,
            "type": "anomaly",
            "severity": severity,
            "message": format!("event {id}"),
            "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0
        })
    }

    pub fn ai_decision(node_id: &str, severity: &str) -> Value {
        serde_json::json!({
            "type": "ai_decision",
            "data": {
                "node_id": node_id,
                "severity": severity,
                "anomalies": ["cpu spike"],
                "actions": ["redistribute_load"],
                "reasoning": "sustained cpu above threshold",
                "confidence": 0.92,
                "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0
            }
        })
    }

    pub fn load_redistributed(node_id: &str) -> Value {
        serde_json::json!({"type": "load_redistributed", "data": {"node_id": node_id}})
    }

    /// Même frame, mais avec l'ancien discriminant `event`
    pub fn legacy(frame: Value) -> Value {
        match frame {
            Value::Object(mut map) => {
                if let Some(kind) = map.remove("type") {
                    map.insert("event".to_string(), kind);
                }
                Value::Object(map)
            }
            other => other,
        }
    }
}
