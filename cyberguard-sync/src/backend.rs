//! HTTP client for the backend REST API

use crate::error::{Result, SyncError};
use crate::models::{BackendHealth, ClaimMetrics, Node, SecurityEvent, Severity};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct NodesEnvelope {
    #[serde(deserialize_with = "crate::models::deserialize_node_list")]
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    events: Vec<SecurityEvent>,
}

/// Options of an on-demand threat simulation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatOptions {
    /// Target node, `None` lets the backend pick one
    pub node_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for ThreatOptions {
    fn default() -> Self {
        Self {
            node_id: None,
            kind: "anomaly".to_string(),
            severity: Severity::Medium,
            message: None,
        }
    }
}

/// Reply of `/demo/ddos/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemoStarted {
    #[serde(default)]
    pub status: String,
    pub node_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cyberguard-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let response = self.http.get(self.url(path)).send().await?;
        check_status(response, path)
    }

    async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = check_status(request.send().await?, path)?;
        let text = response.text().await?;
        debug!("POST {} -> {}", path, text);
        // action replies are informational, an empty or non-JSON body is fine
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let envelope: NodesEnvelope = decode(self.get("/api/nodes").await?).await?;
        Ok(envelope.nodes)
    }

    pub async fn list_events(&self) -> Result<Vec<SecurityEvent>> {
        let envelope: EventsEnvelope = decode(self.get("/api/events").await?).await?;
        Ok(envelope.events)
    }

    pub async fn metrics(&self) -> Result<ClaimMetrics> {
        decode(self.get("/api/metrics").await?).await
    }

    pub async fn metrics_csv(&self) -> Result<String> {
        Ok(self.get("/api/metrics.csv").await?.text().await?)
    }

    pub async fn health(&self) -> Result<BackendHealth> {
        decode(self.get("/health").await?).await
    }

    pub async fn quarantine(&self, node_id: &str) -> Result<Value> {
        self.post(&format!("/api/quarantine/{node_id}"), None).await
    }

    pub async fn release(&self, node_id: &str) -> Result<Value> {
        self.post(&format!("/api/release/{node_id}"), None).await
    }

    pub async fn attack(&self, node_id: &str, kind: &str) -> Result<Value> {
        self.post(&format!("/api/attack/{node_id}/{kind}"), None).await
    }

    pub async fn simulate_threat(&self, options: &ThreatOptions) -> Result<Value> {
        let target = options.node_id.as_deref().unwrap_or("random");
        let body = serde_json::to_value(options)?;
        self.post(&format!("/simulate-threat/{target}"), Some(&body)).await
    }

    pub async fn redistribute_load(&self, node_id: &str) -> Result<Value> {
        self.post(&format!("/redistribute-load/{node_id}"), None).await
    }

    pub async fn start_ddos_demo(&self, node_id: &str) -> Result<DemoStarted> {
        let reply = self.post(&format!("/demo/ddos/{node_id}"), None).await?;
        Ok(serde_json::from_value(reply).unwrap_or(DemoStarted {
            status: "started".to_string(),
            node_id: None,
        }))
    }

    pub async fn reset_demo(&self) -> Result<Value> {
        self.post("/demo/reset", None).await
    }
}

fn check_status(response: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        });
    }
    Ok(response)
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_options_body() {
        let options = ThreatOptions {
            node_id: Some("n2".into()),
            severity: Severity::Critical,
            ..Default::default()
        };
        let body = serde_json::to_value(&options).unwrap();
        assert_eq!(body["type"], "anomaly");
        assert_eq!(body["severity"], "critical");
        assert_eq!(body["node_id"], "n2");
        assert!(body.get("message").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("http://localhost:8010/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/api/nodes"), "http://localhost:8010/api/nodes");
    }
}
