//! Sync client configuration
//!
//! Layers, lowest to highest priority:
//! - built-in defaults (local backend on port 8010)
//! - optional TOML file (`CYBERGUARD_CONFIG`, default `cyberguard.toml`)
//! - environment variables, `.env` included

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_HTTP_URL: &str = "http://localhost:8010";
pub const DEFAULT_CONFIG_FILE: &str = "cyberguard.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the backend REST API
    pub http_url: String,
    /// Push channel endpoint; derived from `http_url` when absent
    pub ws_url: Option<String>,
    pub reconnect: ReconnectConfig,
    pub keepalive_secs: u64,
    pub event_capacity: usize,
    pub decision_capacity: usize,
    pub history_capacity: usize,
    pub trend_sample_secs: u64,
    pub highlight_ms: u64,
    pub status_message_ms: u64,
    /// Periodic full refresh, 0 disables it
    pub refresh_secs: u64,
    pub request_timeout_secs: u64,
    /// Mirror AI decisions into the security event feed
    pub merge_ai_decisions: bool,
    /// Raise the alert signal on high/critical events
    pub alert_sound: bool,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub detection_target_secs: u64,
    pub poll_secs: u64,
    pub max_duration_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: None,
            reconnect: ReconnectConfig::default(),
            keepalive_secs: 15,
            event_capacity: 200,
            decision_capacity: 50,
            history_capacity: 60,
            trend_sample_secs: 3,
            highlight_ms: 3000,
            status_message_ms: 2500,
            refresh_secs: 3,
            request_timeout_secs: 10,
            merge_ai_decisions: true,
            alert_sound: true,
            demo: DemoConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            detection_target_secs: 60,
            poll_secs: 3,
            max_duration_secs: 75,
        }
    }
}

impl SyncConfig {
    /// Load config from file + environment
    pub fn load() -> Result<Self> {
        // Ok si .env n'existe pas
        dotenvy::dotenv().ok();

        let path = std::env::var("CYBERGUARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = if Path::new(&path).exists() {
            info!("Loading configuration from {}", path);
            Self::from_file(&path)?
        } else {
            debug!("No {} found, using default configuration", path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&content)?)
    }

    /// Apply `CYBERGUARD_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CYBERGUARD_HTTP_URL") {
            self.http_url = url;
        }
        if let Some(url) = lookup("CYBERGUARD_WS_URL") {
            self.ws_url = Some(url);
        }
        if let Some(secs) = lookup("CYBERGUARD_REFRESH_SECS") {
            self.refresh_secs = secs
                .trim()
                .parse()
                .map_err(|_| SyncError::Config(format!("CYBERGUARD_REFRESH_SECS is not a number: {secs}")))?;
        }
        if let Some(flag) = lookup("CYBERGUARD_ALERT_SOUND") {
            self.alert_sound = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.http_url.starts_with("http://") || self.http_url.starts_with("https://")) {
            return Err(SyncError::Config(format!("http_url must be http(s): {}", self.http_url)));
        }
        let ws = self.ws_endpoint();
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            return Err(SyncError::Config(format!("ws_url must be ws(s): {ws}")));
        }
        if self.event_capacity == 0 || self.decision_capacity == 0 || self.history_capacity == 0 {
            return Err(SyncError::Config("buffer capacities must be greater than zero".into()));
        }
        if self.keepalive_secs == 0 || self.trend_sample_secs == 0 {
            return Err(SyncError::Config("keep-alive and trend intervals must be greater than zero".into()));
        }
        let multiplier = self.reconnect.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(SyncError::Config(format!("reconnect multiplier must be finite and >= 1.0: {multiplier}")));
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(SyncError::Config("reconnect max_delay_ms is below initial_delay_ms".into()));
        }
        Ok(())
    }

    /// Push channel URL: explicit value, or `http_url` with the scheme
    /// switched to ws and `/ws` appended
    pub fn ws_endpoint(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.http_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn trend_interval(&self) -> Duration {
        Duration::from_secs(self.trend_sample_secs)
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn status_duration(&self) -> Duration {
        Duration::from_millis(self.status_message_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_secs > 0).then(|| Duration::from_secs(self.refresh_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.http_url, "http://localhost:8010");
        assert_eq!(config.ws_endpoint(), "ws://localhost:8010/ws");
        assert_eq!(config.reconnect.initial_delay_ms, 1500);
        assert_eq!(config.history_capacity, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ws_endpoint_derivation() {
        let mut config = SyncConfig {
            http_url: "https://soc.example.org/".into(),
            ..SyncConfig::default()
        };
        assert_eq!(config.ws_endpoint(), "wss://soc.example.org/ws");

        config.ws_url = Some("ws://push.example.org:9000/stream".into());
        assert_eq!(config.ws_endpoint(), "ws://push.example.org:9000/stream");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CYBERGUARD_HTTP_URL", "http://10.0.0.5:8000"),
            ("CYBERGUARD_REFRESH_SECS", "0"),
            ("CYBERGUARD_ALERT_SOUND", "off"),
        ]);
        let mut config = SyncConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.ws_endpoint(), "ws://10.0.0.5:8000/ws");
        assert_eq!(config.refresh_interval(), None);
        assert!(!config.alert_sound);
    }

    #[test]
    fn test_env_rejects_bad_refresh() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env(|key| (key == "CYBERGUARD_REFRESH_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http_url = \"http://backend:8000\"\nevent_capacity = 50\n\n[reconnect]\nmax_delay_ms = 1500").unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.http_url, "http://backend:8000");
        assert_eq!(config.event_capacity, 50);
        assert_eq!(config.reconnect.max_delay_ms, 1500);
        assert_eq!(config.reconnect.initial_delay_ms, 1500);
        assert_eq!(config.decision_capacity, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let config = SyncConfig {
            reconnect: ReconnectConfig {
                initial_delay_ms: 5000,
                max_delay_ms: 1000,
                multiplier: 2.0,
            },
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_multiplier() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconnect]\nmultiplier = inf").unwrap();
        let config = SyncConfig::from_file(file.path()).unwrap();
        assert!(config.reconnect.multiplier.is_infinite());
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.reconnect.multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }
}
