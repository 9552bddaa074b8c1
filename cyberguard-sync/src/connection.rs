//! Push channel lifecycle
//!
//! One supervisor task per client owns the channel. It connects, pumps
//! frames into the [`Ingestor`], pings on a fixed interval and, when the
//! channel closes or fails, schedules exactly one reconnect after a capped
//! exponential backoff. Teardown cancels both the live session and any
//! pending reconnect.

use crate::config::ReconnectConfig;
use crate::error::{Result, SyncError};
use crate::ingest::Ingestor;
use crate::protocol::PING;
use crate::shutdown::ShutdownListener;
use crate::signals::{ConnectionState, Signals};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// An open text channel. Dropping `outbound` closes the connection; the
/// transport closing ends `inbound`.
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Channel>>;
}

/// WebSocket transport
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Channel>> {
        let url = url.to_string();
        Box::pin(async move {
            let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;
            let (mut sink, mut source) = stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => match outgoing {
                            Some(text) => {
                                if let Err(e) = sink.send(Message::Text(text.into())).await {
                                    debug!("ws send failed: {}", e);
                                    break;
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                break;
                            }
                        },
                        incoming = source.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text.as_str().to_owned()).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("ws closed by peer: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!("ws read failed: {}", e);
                                break;
                            }
                            None => break,
                        },
                    }
                }
            });

            Ok(Channel {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// Capped exponential backoff, reset once a channel opens
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub endpoint: String,
    pub state: ConnectionState,
    pub attempts: u32,
    pub reconnects: u32,
    pub frames_received: u64,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    attempts: u32,
    reconnects: u32,
    frames_received: u64,
    connected_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Counters for the push channel
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_attempt(&self) {
        self.inner.lock().attempts += 1;
    }

    fn mark_connected(&self) {
        let mut inner = self.inner.lock();
        inner.connected_since = Some(Utc::now());
        inner.last_error = None;
    }

    fn mark_disconnected(&self, error: Option<String>) {
        let mut inner = self.inner.lock();
        inner.connected_since = None;
        if error.is_some() {
            inner.last_error = error;
        }
    }

    fn increment_reconnects(&self) {
        self.inner.lock().reconnects += 1;
    }

    fn mark_frame(&self) {
        self.inner.lock().frames_received += 1;
    }

    pub fn report(&self, endpoint: &str, state: ConnectionState) -> ConnectionHealth {
        let inner = self.inner.lock();
        ConnectionHealth {
            endpoint: endpoint.to_string(),
            state,
            attempts: inner.attempts,
            reconnects: inner.reconnects,
            frames_received: inner.frames_received,
            connected_since: inner.connected_since,
            last_error: inner.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Shutdown,
}

/// Everything the supervisor task needs, cloned in on spawn
#[derive(Clone)]
struct Supervisor {
    url: String,
    connector: Arc<dyn Connector>,
    ingestor: Ingestor,
    signals: Signals,
    tracker: ConnectionTracker,
    reconnect: ReconnectConfig,
    keepalive: Duration,
    shutdown: ShutdownListener,
}

pub struct ConnectionManager {
    supervisor: Supervisor,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        url: String,
        connector: Arc<dyn Connector>,
        ingestor: Ingestor,
        signals: Signals,
        reconnect: ReconnectConfig,
        keepalive: Duration,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            supervisor: Supervisor {
                url,
                connector,
                ingestor,
                signals,
                tracker: ConnectionTracker::new(),
                reconnect,
                keepalive,
                shutdown,
            },
            task: Mutex::new(None),
        }
    }

    /// Start the supervisor. Returns `false` when one is already running or
    /// the client is being torn down.
    pub fn connect(&self) -> bool {
        let mut task = self.task.lock();
        if self.supervisor.shutdown.is_triggered() {
            return false;
        }
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("push channel already supervised");
            return false;
        }
        let supervisor = self.supervisor.clone();
        *task = Some(tokio::spawn(supervisor.run()));
        true
    }

    /// Wait for the supervisor to exit after teardown was triggered
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("push channel task ended abnormally: {}", e);
            }
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.supervisor
            .tracker
            .report(&self.supervisor.url, self.supervisor.signals.connection())
    }

    pub fn endpoint(&self) -> &str {
        &self.supervisor.url
    }
}

impl Supervisor {
    async fn run(mut self) {
        let mut policy = ReconnectPolicy::new(&self.reconnect);

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            self.signals.set_connection(ConnectionState::Connecting);
            self.tracker.mark_attempt();
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match attempt {
                Ok(channel) => {
                    info!("Push channel open: {}", self.url);
                    policy.reset();
                    self.tracker.mark_connected();
                    self.signals.set_connection(ConnectionState::Connected);

                    let end = self.run_session(channel).await;
                    self.tracker.mark_disconnected(None);
                    self.signals.set_connection(ConnectionState::Disconnected);
                    if end == SessionEnd::Shutdown {
                        break;
                    }
                    warn!("Push channel closed: {}", self.url);
                }
                Err(e) => {
                    warn!("Push channel connect failed: {}", e);
                    self.tracker.mark_disconnected(Some(e.to_string()));
                    self.signals.set_connection(ConnectionState::Disconnected);
                }
            }

            let delay = policy.next_delay();
            self.tracker.increment_reconnects();
            debug!("Reconnecting in {:?}", delay);
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.signals.set_connection(ConnectionState::Disconnected);
        debug!("Push channel supervisor stopped");
    }

    async fn run_session(&mut self, channel: Channel) -> SessionEnd {
        let Channel { outbound, mut inbound } = channel;
        let mut keepalive = tokio::time::interval_at(Instant::now() + self.keepalive, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => return SessionEnd::Shutdown,
                frame = inbound.recv() => match frame {
                    Some(text) => {
                        self.tracker.mark_frame();
                        self.ingestor.handle_text(&text);
                    }
                    None => return SessionEnd::Closed,
                },
                _ = keepalive.tick() => {
                    if outbound.send(PING.to_string()).is_err() {
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }
}
