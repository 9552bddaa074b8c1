/*!
Test Harness pour le client de synchronisation

Facilite l'écriture de tests d'intégration avec:
- un backend stub démarré sur un port éphémère
- un connecteur push mocké, ou le vrai WebSocket du stub
- des helpers d'attente sur l'état du client
*/

use crate::mock_push::MockConnector;
use crate::stub_backend::StubBackend;
use anyhow::Result;
use cyberguard_sync::{SyncClient, SyncConfig};
use std::sync::Arc;
use std::time::Duration;

/// Config avec des délais courts, pointée sur `http_url`
pub fn fast_config(http_url: &str) -> SyncConfig {
    let mut config = SyncConfig {
        http_url: http_url.to_string(),
        request_timeout_secs: 5,
        refresh_secs: 0,
        ..SyncConfig::default()
    };
    config.reconnect.initial_delay_ms = 100;
    config.reconnect.max_delay_ms = 400;
    config.status_message_ms = 300;
    config.highlight_ms = 300;
    config
}

/// Harness de test complet: stub backend + connecteur mocké
pub struct TestHarness {
    pub backend: StubBackend,
    pub connector: MockConnector,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub async fn new() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        Ok(Self {
            backend: StubBackend::start().await?,
            connector: MockConnector::new(),
        })
    }

    pub fn config(&self) -> SyncConfig {
        fast_config(&self.backend.http_url())
    }

    /// Client branché sur le connecteur mocké
    pub fn mock_client(&self, config: SyncConfig) -> Result<SyncClient> {
        Ok(SyncClient::with_connector(config, Arc::new(self.connector.clone()))?)
    }

    /// Client branché sur le vrai WebSocket du stub
    pub fn ws_client(&self) -> Result<SyncClient> {
        let mut config = self.config();
        config.ws_url = Some(self.backend.ws_url());
        Ok(SyncClient::new(config)?)
    }
}

/// Attend que `condition` devienne vraie, vérifiée toutes les 10 ms
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let satisfied = condition();
    if !satisfied {
        log::warn!("⏰ Timeout after {:?}", timeout);
    }
    satisfied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_config_points_to_stub() {
        let harness = TestHarness::new().await.unwrap();
        let config = harness.config();
        assert_eq!(config.http_url, harness.backend.http_url());
        assert!(config.ws_endpoint().ends_with("/ws"));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_wait_until() {
        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(1), || {
            calls += 1;
            calls >= 3
        })
        .await);
        assert!(!wait_until(Duration::from_millis(30), || false).await);
    }
}
