/*!
Backend HTTP + WebSocket de test

Serveur axum sur un port éphémère qui imite le backend CyberGuard:
- lectures `/api/nodes`, `/api/events`, `/api/metrics`, `/api/metrics.csv`, `/health`
- actions POST, toutes enregistrées, pouvant être mises en échec
- `/ws`: diffuse les frames poussées par le test, répond `pong` au `ping`
*/

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

struct StubState {
    nodes: Mutex<Vec<Value>>,
    events: Mutex<Vec<Value>>,
    metrics: Mutex<Value>,
    requests: Mutex<Vec<RecordedRequest>>,
    ws_received: Mutex<Vec<String>>,
    fail_actions: AtomicBool,
    fail_reads: AtomicBool,
    read_delay: Mutex<Duration>,
    action_delay: Mutex<Duration>,
    push: broadcast::Sender<String>,
    kick: watch::Sender<u64>,
    ws_clients: AtomicUsize,
}

impl StubState {
    fn record(&self, method: &str, uri: &Uri, body: Option<Value>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            body,
        });
    }

    async fn read_gate(&self) -> Option<Response> {
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Some((StatusCode::SERVICE_UNAVAILABLE, "stub read failure").into_response());
        }
        None
    }
}

/// Stub du backend, arrêté au drop
pub struct StubBackend {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl StubBackend {
    pub async fn start() -> Result<Self> {
        let (push, _) = broadcast::channel(256);
        let (kick, _) = watch::channel(0u64);
        let state = Arc::new(StubState {
            nodes: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            metrics: Mutex::new(default_metrics(0, None)),
            requests: Mutex::new(Vec::new()),
            ws_received: Mutex::new(Vec::new()),
            fail_actions: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            read_delay: Mutex::new(Duration::ZERO),
            action_delay: Mutex::new(Duration::ZERO),
            push,
            kick,
            ws_clients: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/nodes", get(list_nodes))
            .route("/api/events", get(list_events))
            .route("/api/metrics", get(metrics))
            .route("/api/metrics.csv", get(metrics_csv))
            .route("/health", get(health))
            .route("/api/quarantine/{id}", post(action))
            .route("/api/release/{id}", post(action))
            .route("/api/attack/{id}/{kind}", post(action))
            .route("/simulate-threat/{id}", post(action))
            .route("/redistribute-load/{id}", post(action))
            .route("/demo/ddos/{id}", post(action))
            .route("/demo/reset", post(action))
            .route("/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ Stub backend stopped: {}", e);
            }
        });
        log::info!("🧪 Stub backend listening on {}", addr);

        Ok(Self { addr, state, server })
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn set_nodes(&self, nodes: Vec<Value>) {
        *self.state.nodes.lock().unwrap() = nodes;
    }

    pub fn set_events(&self, events: Vec<Value>) {
        *self.state.events.lock().unwrap() = events;
    }

    pub fn set_metrics(&self, metrics: Value) {
        *self.state.metrics.lock().unwrap() = metrics;
    }

    /// Métriques avec `samples` détections, la dernière en `last_seconds`
    pub fn set_detection(&self, samples: u64, last_seconds: Option<f64>) {
        self.set_metrics(default_metrics(samples, last_seconds));
    }

    pub fn fail_actions(&self, fail: bool) {
        self.state.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.state.read_delay.lock().unwrap() = delay;
    }

    pub fn set_action_delay(&self, delay: Duration) {
        *self.state.action_delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Diffuse une frame à tous les clients WebSocket connectés
    pub fn push(&self, frame: &Value) -> usize {
        self.state.push.send(frame.to_string()).unwrap_or(0)
    }

    /// Frames texte reçues des clients
    pub fn ws_received(&self) -> Vec<String> {
        self.state.ws_received.lock().unwrap().clone()
    }

    pub fn ws_clients(&self) -> usize {
        self.state.ws_clients.load(Ordering::SeqCst)
    }

    /// Coupe toutes les sessions WebSocket ouvertes
    pub fn kick_ws_clients(&self) {
        self.state.kick.send_modify(|generation| *generation += 1);
    }

    pub async fn wait_for_ws_clients(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.ws_clients() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn default_metrics(samples: u64, last_seconds: Option<f64>) -> Value {
    json!({
        "uptime": 120.0,
        "uptime_percent": 100.0,
        "downtime_events": 0,
        "workflow_exec_ms": {"baseline": 1000.0, "optimized": 400.0, "improvement_pct": 60.0},
        "error_rate_per_hour": {"baseline": 10.0, "optimized": 2.0, "reduction_pct": 80.0},
        "threat_detection": {
            "avg_seconds": last_seconds,
            "samples": samples,
            "claim_target_seconds": 60,
            "last_seconds": last_seconds,
            "history": last_seconds.map(|s| vec![s]).unwrap_or_default()
        },
        "incidents_active": 0,
        "thread_aware_resilience": true,
        "thread_efficiency": 0.95,
        "autonomous_success_rate": 0.9,
        "health_score": 97.5
    })
}

async fn list_nodes(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    state.record("GET", &uri, None);
    if let Some(failure) = state.read_gate().await {
        return failure;
    }
    let nodes = state.nodes.lock().unwrap().clone();
    Json(json!({ "nodes": nodes })).into_response()
}

async fn list_events(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    state.record("GET", &uri, None);
    if let Some(failure) = state.read_gate().await {
        return failure;
    }
    let events = state.events.lock().unwrap().clone();
    Json(json!({ "events": events })).into_response()
}

async fn metrics(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    state.record("GET", &uri, None);
    if let Some(failure) = state.read_gate().await {
        return failure;
    }
    let metrics = state.metrics.lock().unwrap().clone();
    Json(metrics).into_response()
}

async fn metrics_csv(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    state.record("GET", &uri, None);
    (
        [(axum::http::header::CONTENT_TYPE, "text/csv")],
        "metric,baseline,optimized,improvement_pct\r\nworkflow_exec_ms,1000.0,400.0,60.0\r\nerror_rate_per_hour,10.0,2.0,80.0\r\n",
    )
        .into_response()
}

async fn health(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    state.record("GET", &uri, None);
    let nodes = state.nodes.lock().unwrap().len();
    Json(json!({
        "status": "ok",
        "services": {"mongo": false, "redis": false, "ai": true},
        "nodes": nodes,
        "uptime": 120.0
    }))
    .into_response()
}

async fn action(State(state): State<Arc<StubState>>, uri: Uri, body: Bytes) -> Response {
    let parsed = serde_json::from_slice::<Value>(&body).ok();
    state.record("POST", &uri, parsed);

    let delay = *state.action_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if state.fail_actions.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "stub failure"}))).into_response();
    }

    let path = uri.path();
    if let Some(target) = path.strip_prefix("/demo/ddos/") {
        let node_id = if target == "random" {
            state
                .nodes
                .lock()
                .unwrap()
                .first()
                .and_then(|n| n["id"].as_str().map(str::to_string))
                .unwrap_or_else(|| "node-1".to_string())
        } else {
            target.to_string()
        };
        return Json(json!({"status": "started", "node_id": node_id})).into_response();
    }
    if path == "/demo/reset" {
        return Json(json!({"status": "reset"})).into_response();
    }
    Json(json!({"status": "ok"})).into_response()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<StubState>>) -> Response {
    ws.on_upgrade(move |socket| push_session(socket, state))
}

async fn push_session(mut socket: WebSocket, state: Arc<StubState>) {
    let mut frames = state.push.subscribe();
    let mut kick = state.kick.subscribe();
    state.ws_clients.fetch_add(1, Ordering::SeqCst);
    log::info!("🔗 Stub push session opened");

    loop {
        tokio::select! {
            _ = kick.changed() => break,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_string();
                    state.ws_received.lock().unwrap().push(text.clone());
                    if text == "ping" && socket.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    state.ws_clients.fetch_sub(1, Ordering::SeqCst);
    let _ = socket.send(Message::Close(None)).await;
    log::info!("🔌 Stub push session closed");
}
