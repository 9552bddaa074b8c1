//! DDoS demo scenario
//!
//! The client keeps its own start instant so it can show elapsed time and a
//! countdown to the detection target. After starting, the metrics endpoint
//! is polled until the backend reports a new detection sample or the poll
//! window runs out.

use crate::backend::BackendClient;
use crate::commands::CommandDispatcher;
use crate::config::DemoConfig;
use crate::error::Result;
use crate::shutdown::ShutdownListener;
use crate::signals::Signals;
use crate::store::{DashboardState, Shared};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct DemoRun {
    node_id: String,
    started: Instant,
    started_at: DateTime<Utc>,
    baseline_samples: u64,
    detected_in: Option<f64>,
    polling: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoStatus {
    pub node_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
    /// Seconds left before the detection target, floored at zero
    pub countdown_secs: u64,
    pub detected_in_secs: Option<f64>,
    pub passed: Option<bool>,
    pub polling: bool,
}

pub struct DemoController {
    backend: BackendClient,
    dispatcher: CommandDispatcher,
    state: Shared<DashboardState>,
    signals: Signals,
    config: DemoConfig,
    shutdown: ShutdownListener,
    run: Arc<Mutex<Option<DemoRun>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl DemoController {
    pub fn new(
        dispatcher: CommandDispatcher,
        state: Shared<DashboardState>,
        signals: Signals,
        config: DemoConfig,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            backend: dispatcher.backend().clone(),
            dispatcher,
            state,
            signals,
            config,
            shutdown,
            run: Arc::new(Mutex::new(None)),
            poller: Mutex::new(None),
        }
    }

    /// Start the scenario against `target`, the first node by name, or a
    /// backend-chosen node. A second start while a run is still polling is
    /// a no-op that returns the active run.
    pub async fn start_ddos(&self, target: Option<String>) -> Result<DemoStatus> {
        if let Some(status) = self.status().filter(|status| status.polling) {
            debug!("DDoS demo already running on {}", status.node_id);
            return Ok(status);
        }

        let target = target
            .or_else(|| self.state.lock().nodes().first().map(|n| n.id.clone()))
            .unwrap_or_else(|| "random".to_string());

        // baseline so an older detection does not end the poll right away
        if let Ok(metrics) = self.backend.metrics().await {
            self.state.lock().record_metrics(metrics);
        }
        let baseline_samples = self
            .state
            .lock()
            .metrics()
            .map(|m| m.threat_detection.samples)
            .unwrap_or(0);

        let reply = self
            .dispatcher
            .run("demo_ddos", self.backend.start_ddos_demo(&target))
            .await?;
        let node_id = reply.node_id.unwrap_or(target);
        info!("DDoS demo started on {}", node_id);

        let run = DemoRun {
            node_id,
            started: Instant::now(),
            started_at: Utc::now(),
            baseline_samples,
            detected_in: None,
            polling: true,
        };
        let status = to_status(&run, self.config.detection_target_secs);
        *self.run.lock() = Some(run);
        self.spawn_poller(baseline_samples);
        Ok(status)
    }

    fn spawn_poller(&self, baseline_samples: u64) {
        let backend = self.backend.clone();
        let state = self.state.clone();
        let signals = self.signals.clone();
        let run = self.run.clone();
        let mut shutdown = self.shutdown.clone();
        let every = Duration::from_secs(self.config.poll_secs.max(1));
        let window = Duration::from_secs(self.config.max_duration_secs);

        let handle = tokio::spawn(async move {
            let deadline = Instant::now() + window;
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            let mut detected_in = None;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => return,
                    _ = tokio::time::sleep_until(deadline) => {
                        info!("DDoS demo: no detection within {:?}", window);
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let fetched = tokio::select! {
                    biased;
                    _ = shutdown.wait() => return,
                    result = backend.metrics() => result,
                };
                match fetched {
                    Ok(metrics) => {
                        let samples = metrics.threat_detection.samples;
                        let last = metrics.threat_detection.last_seconds;
                        state.lock().record_metrics(metrics);
                        signals.bump_revision();
                        if samples > baseline_samples {
                            info!("DDoS demo: detection after {:?}s", last);
                            detected_in = last;
                            break;
                        }
                    }
                    Err(e) => warn!("DDoS demo metrics poll failed: {}", e),
                }
            }

            if let Some(run) = run.lock().as_mut() {
                run.polling = false;
                run.detected_in = detected_in;
            }
            signals.bump_revision();
        });

        if let Some(previous) = self.poller.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the poller, forget the run and reset the backend scenario
    pub async fn reset(&self) -> Result<()> {
        self.stop_poller();
        *self.run.lock() = None;

        self.dispatcher.run("demo_reset", self.backend.reset_demo()).await?;
        match self.backend.metrics().await {
            Ok(metrics) => {
                self.state.lock().record_metrics(metrics);
            }
            Err(e) => warn!("Failed to reload metrics after reset: {}", e),
        }
        self.signals.bump_revision();
        Ok(())
    }

    pub fn status(&self) -> Option<DemoStatus> {
        self.run
            .lock()
            .as_ref()
            .map(|run| to_status(run, self.config.detection_target_secs))
    }

    pub fn is_polling(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|run| run.polling)
    }

    pub fn baseline_samples(&self) -> Option<u64> {
        self.run.lock().as_ref().map(|run| run.baseline_samples)
    }

    fn stop_poller(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }

    /// Wait for the poller after teardown was triggered
    pub async fn join(&self) {
        let handle = self.poller.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn to_status(run: &DemoRun, target_secs: u64) -> DemoStatus {
    let elapsed_secs = run.started.elapsed().as_secs();
    DemoStatus {
        node_id: run.node_id.clone(),
        started_at: run.started_at,
        elapsed_secs,
        countdown_secs: target_secs.saturating_sub(elapsed_secs),
        detected_in_secs: run.detected_in,
        passed: run.detected_in.map(|secs| secs <= target_secs as f64),
        polling: run.polling,
    }
}
