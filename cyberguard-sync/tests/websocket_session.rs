//! End-to-end session over a real WebSocket against the stub backend

use cyberguard_devkit::{wait_until, SyncMessageBuilder, TestHarness};
use cyberguard_sync::{ConnectionState, SyncClient};
use std::time::Duration;

async fn started_ws_client(harness: &TestHarness, keepalive_secs: u64) -> SyncClient {
    let mut config = harness.config();
    config.ws_url = Some(harness.backend.ws_url());
    config.keepalive_secs = keepalive_secs;
    let client = SyncClient::new(config).unwrap();
    client.start().await;

    assert!(harness.backend.wait_for_ws_clients(1, Duration::from_secs(5)).await);
    let signals = client.signals().clone();
    assert!(wait_until(Duration::from_secs(5), || signals.connection() == ConnectionState::Connected).await);
    client
}

#[tokio::test]
async fn test_frames_flow_over_websocket() {
    let harness = TestHarness::new().await.unwrap();
    let client = started_ws_client(&harness, 15).await;

    harness.backend.push(&SyncMessageBuilder::init(vec![
        SyncMessageBuilder::nested_node("n1", 25.0, "healthy"),
        SyncMessageBuilder::nested_node("n2", 80.0, "critical"),
    ]));
    harness
        .backend
        .push(&SyncMessageBuilder::legacy(SyncMessageBuilder::security_event("e1", "n2", "high")));
    harness.backend.push(&SyncMessageBuilder::node_update("n2", 0.8));
    harness.backend.push(&SyncMessageBuilder::ai_decision("n2", "critical"));

    let state = client.state();
    assert!(wait_until(Duration::from_secs(5), || state.lock().decisions().len() == 1).await);

    let snapshot = client.snapshot();
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.events.len(), 2);
    assert_eq!(snapshot.node_history["n2"].cpu, vec![80.0]);
    assert!(client.connection_health().frames_received >= 4);

    client.shutdown().await;
    assert!(wait_until(Duration::from_secs(5), || harness.backend.ws_clients() == 0).await);
}

#[tokio::test]
async fn test_keepalive_ping_gets_pong() {
    let harness = TestHarness::new().await.unwrap();
    let client = started_ws_client(&harness, 1).await;

    let backend = &harness.backend;
    assert!(wait_until(Duration::from_secs(3), || backend.ws_received().iter().any(|f| f == "ping")).await);

    // the pong reply is swallowed without touching state
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.snapshot().nodes.len(), 0);
    assert_eq!(client.signals().connection(), ConnectionState::Connected);
    client.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let harness = TestHarness::new().await.unwrap();
    let client = started_ws_client(&harness, 15).await;

    harness.backend.kick_ws_clients();
    let health_client = &client;
    assert!(wait_until(Duration::from_secs(5), || health_client.connection_health().reconnects == 1).await);
    assert!(harness.backend.wait_for_ws_clients(1, Duration::from_secs(5)).await);
    let signals = client.signals().clone();
    assert!(wait_until(Duration::from_secs(5), || signals.connection() == ConnectionState::Connected).await);

    // the new server session may still be subscribing, so keep pushing
    let state = client.state();
    let backend = &harness.backend;
    assert!(wait_until(Duration::from_secs(5), || {
        backend.push(&SyncMessageBuilder::node_update("n9", 0.4));
        state.lock().node("n9").is_some()
    })
    .await);
    assert_eq!(client.connection_health().reconnects, 1);

    client.shutdown().await;
}
