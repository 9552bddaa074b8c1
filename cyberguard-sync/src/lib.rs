/*!
# CyberGuard Sync - Client de synchronisation temps réel

Keeps a local picture of the monitored cluster consistent with the backend:
- push channel (WebSocket) with capped exponential reconnect and keep-alive
- typed ingestion of node, event and AI decision frames, behind a pause gate
- bounded feeds and sparkline history
- fire-and-forget operator actions with busy / status feedback
- periodic HTTP refresh that never overwrites a newer push update
*/

pub mod backend;
pub mod buffer;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod demo;
pub mod error;
pub mod history;
pub mod ingest;
pub mod models;
pub mod protocol;
pub mod refresh;
pub mod sampler;
pub mod shutdown;
pub mod signals;
pub mod store;

pub use backend::{BackendClient, ThreatOptions};
pub use client::{DashboardSnapshot, SyncClient};
pub use commands::Action;
pub use config::SyncConfig;
pub use connection::{Channel, ConnectionHealth, Connector, WsConnector};
pub use error::{Result, SyncError};
pub use models::{AiDecision, ClaimMetrics, Node, NodeHealth, SecurityEvent, Severity};
pub use signals::{ConnectionState, Signals, StatusKind, StatusMessage};
