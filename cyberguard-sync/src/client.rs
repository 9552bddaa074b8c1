//! Client facade: owns the state, the push channel and every background task

use crate::backend::{BackendClient, ThreatOptions};
use crate::commands::{Action, CommandDispatcher};
use crate::config::SyncConfig;
use crate::connection::{ConnectionHealth, ConnectionManager, Connector, WsConnector};
use crate::demo::{DemoController, DemoStatus};
use crate::error::Result;
use crate::history::{ClusterSeries, NodeSeries};
use crate::ingest::Ingestor;
use crate::models::{AiDecision, BackendHealth, ClaimMetrics, Node, SecurityEvent};
use crate::refresh::{RefreshKind, RefreshReport, Refresher};
use crate::sampler::spawn_trend_sampler;
use crate::shutdown::Shutdown;
use crate::signals::{ConnectionState, Signals, StatusMessage};
use crate::store::{new_shared, DashboardState, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything a renderer needs for one frame, cloned out of the state
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub connection: ConnectionState,
    pub paused: bool,
    pub busy: bool,
    pub highlight: Option<String>,
    pub status: Option<StatusMessage>,
    pub load_error: Option<String>,
    pub nodes: Vec<Node>,
    pub events: Vec<SecurityEvent>,
    pub decisions: Vec<AiDecision>,
    pub node_history: HashMap<String, NodeSeries>,
    pub cluster: ClusterSeries,
    pub metrics: Option<ClaimMetrics>,
    pub demo: Option<DemoStatus>,
}

pub struct SyncClient {
    config: SyncConfig,
    state: Shared<DashboardState>,
    signals: Signals,
    shutdown: Shutdown,
    connection: ConnectionManager,
    backend: BackendClient,
    dispatcher: CommandDispatcher,
    refresher: Refresher,
    demo: DemoController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    pub fn new(config: SyncConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Build a client over a custom push transport
    pub fn with_connector(config: SyncConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let state = new_shared(DashboardState::new(&config));
        let signals = Signals::new();
        let shutdown = Shutdown::new();
        let backend = BackendClient::new(&config.http_url, config.request_timeout())?;

        let ingestor = Ingestor::new(
            state.clone(),
            signals.clone(),
            config.highlight_duration(),
            config.alert_sound,
        );
        let connection = ConnectionManager::new(
            config.ws_endpoint(),
            connector,
            ingestor,
            signals.clone(),
            config.reconnect.clone(),
            config.keepalive_interval(),
            shutdown.listener(),
        );
        let dispatcher = CommandDispatcher::new(backend.clone(), signals.clone(), config.status_duration());
        let refresher = Refresher::new(backend.clone(), state.clone(), signals.clone());
        let demo = DemoController::new(
            dispatcher.clone(),
            state.clone(),
            signals.clone(),
            config.demo.clone(),
            shutdown.listener(),
        );

        Ok(Self {
            config,
            state,
            signals,
            shutdown,
            connection,
            backend,
            dispatcher,
            refresher,
            demo,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Open the push channel, load the initial snapshot and start the
    /// sampler and periodic refresh. Calling it again only re-runs the
    /// idempotent `connect`.
    pub async fn start(&self) {
        self.connect();

        let spawn_tasks = self.tasks.lock().is_empty() && !self.shutdown.is_triggered();
        if !spawn_tasks {
            return;
        }

        let report = self.refresher.refresh(RefreshKind::Initial).await;
        if !report.is_complete() {
            warn!("Initial load incomplete: {:?}", report);
        }
        if let Err(e) = self.load_metrics().await {
            warn!("Initial metrics load failed: {}", e);
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() || self.shutdown.is_triggered() {
            return;
        }
        tasks.push(spawn_trend_sampler(
            self.state.clone(),
            self.signals.clone(),
            self.config.trend_interval(),
            self.shutdown.listener(),
        ));
        if let Some(every) = self.config.refresh_interval() {
            tasks.push(self.refresher.spawn_periodic(every, self.shutdown.listener()));
        }
        info!("Sync client started against {}", self.config.http_url);
    }

    /// Idempotent; see [`ConnectionManager::connect`]
    pub fn connect(&self) -> bool {
        self.connection.connect()
    }

    /// Tear everything down. No reconnect, poll or refresh happens after
    /// this returns.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        self.connection.join().await;
        self.demo.join().await;
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("Sync client stopped");
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().set_paused(paused);
        self.signals.bump_revision();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().is_paused()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let (nodes, events, decisions, node_history, cluster, metrics, paused) = {
            let state = self.state.lock();
            (
                state.nodes(),
                state.events(),
                state.decisions(),
                state.history().node_series(),
                state.history().cluster().series(),
                state.metrics().cloned(),
                state.is_paused(),
            )
        };
        DashboardSnapshot {
            connection: self.signals.connection(),
            paused,
            busy: self.signals.is_busy(),
            highlight: self.signals.highlight(),
            status: self.signals.status(),
            load_error: self.signals.load_error(),
            nodes,
            events,
            decisions,
            node_history,
            cluster,
            metrics,
            demo: self.demo.status(),
        }
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn state(&self) -> Shared<DashboardState> {
        self.state.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        self.connection.health()
    }

    /// Operator refresh: applies even while paused
    pub async fn refresh(&self) -> RefreshReport {
        self.refresher.refresh(RefreshKind::Manual).await
    }

    pub async fn dispatch(&self, action: Action) -> Result<Value> {
        self.dispatcher.dispatch(action).await
    }

    pub async fn simulate_threat(&self, options: ThreatOptions) -> Result<Value> {
        self.dispatch(Action::SimulateThreat(options)).await
    }

    pub async fn quarantine(&self, node_id: &str) -> Result<Value> {
        self.dispatch(Action::Quarantine(node_id.to_string())).await
    }

    pub async fn release(&self, node_id: &str) -> Result<Value> {
        self.dispatch(Action::Release(node_id.to_string())).await
    }

    pub async fn attack(&self, node_id: &str, kind: &str) -> Result<Value> {
        self.dispatch(Action::Attack {
            node_id: node_id.to_string(),
            kind: kind.to_string(),
        })
        .await
    }

    pub async fn redistribute(&self, node_id: &str) -> Result<Value> {
        self.dispatch(Action::Redistribute(node_id.to_string())).await
    }

    pub async fn demo_ddos(&self, target: Option<String>) -> Result<DemoStatus> {
        self.demo.start_ddos(target).await
    }

    pub async fn demo_reset(&self) -> Result<()> {
        self.demo.reset().await
    }

    pub fn demo_status(&self) -> Option<DemoStatus> {
        self.demo.status()
    }

    /// Fetch `/api/metrics` into the state
    pub async fn load_metrics(&self) -> Result<ClaimMetrics> {
        let metrics = self.backend.metrics().await?;
        self.state.lock().record_metrics(metrics.clone());
        self.signals.bump_revision();
        Ok(metrics)
    }

    pub async fn metrics_csv(&self) -> Result<String> {
        self.backend.metrics_csv().await
    }

    pub async fn backend_health(&self) -> Result<BackendHealth> {
        self.backend.health().await
    }
}
