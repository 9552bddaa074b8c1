//! Frame ingestion through a live (mocked) push session

use cyberguard_devkit::{wait_until, MockConnector, SyncMessageBuilder};
use cyberguard_sync::{ConnectionState, NodeHealth, SyncClient, SyncConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

async fn connected_client(connector: &MockConnector) -> SyncClient {
    let client = SyncClient::with_connector(SyncConfig::default(), Arc::new(connector.clone())).unwrap();
    client.connect();
    let signals = client.signals().clone();
    assert!(wait_until(Duration::from_secs(1), || signals.connection() == ConnectionState::Connected).await);
    client
}

/// Push a marker node and wait until it shows up, so every frame sent
/// before it has been processed
async fn flush(client: &SyncClient, connector: &MockConnector, marker: &str) {
    connector.push_json(&SyncMessageBuilder::node_update(marker, 0.01));
    let state = client.state();
    let marker = marker.to_string();
    assert!(wait_until(Duration::from_secs(1), || state.lock().node(&marker).is_some()).await);
}

#[tokio::test(start_paused = true)]
async fn test_node_map_last_write_wins() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    connector.push_json(&SyncMessageBuilder::init(vec![
        SyncMessageBuilder::nested_node("n1", 10.0, "healthy"),
        SyncMessageBuilder::nested_node("n2", 20.0, "warning"),
    ]));
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.3));
    connector.push_json(&SyncMessageBuilder::security_event("e1", "n2", "low"));
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.7));
    flush(&client, &connector, "zz").await;

    let snapshot = client.snapshot();
    let n1 = snapshot.nodes.iter().find(|n| n.id == "n1").unwrap();
    let n2 = snapshot.nodes.iter().find(|n| n.id == "n2").unwrap();
    assert_eq!(n1.metrics.cpu, 0.7);
    assert_eq!(n2.health, NodeHealth::Degraded);
    assert_eq!(snapshot.events.len(), 1);

    // a full list replaces the map
    connector.push_json(&SyncMessageBuilder::metrics_update(vec![SyncMessageBuilder::nested_node(
        "n3", 40.0, "offline",
    )]));
    let state = client.state();
    assert!(wait_until(Duration::from_secs(1), || state.lock().node_count() == 1).await);
    assert_eq!(state.lock().node("n3").unwrap().health, NodeHealth::Quarantined);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_feed_capacities() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    for i in 0..203 {
        connector.push_json(&SyncMessageBuilder::security_event(&format!("e{i}"), "n1", "medium"));
    }
    for _ in 0..53 {
        connector.push_json(&SyncMessageBuilder::ai_decision("n1", "high"));
    }
    flush(&client, &connector, "marker").await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.decisions.len(), 50);
    // AI decisions are mirrored into the event feed, which stays capped
    assert_eq!(snapshot.events.len(), 200);
    assert_eq!(snapshot.events[0].kind, "ai_decision");
    let raw: Vec<&str> = snapshot
        .events
        .iter()
        .filter(|e| e.kind != "ai_decision")
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(raw.first().copied(), Some("e202"));
    assert_eq!(raw.len(), 147);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_paused_gate() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.1));
    flush(&client, &connector, "m1").await;

    client.set_paused(true);
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.9));
    connector.push_json(&SyncMessageBuilder::security_event("e1", "n1", "critical"));
    connector.push_json(&SyncMessageBuilder::load_redistributed("n1"));
    sleep(Duration::from_millis(100)).await;

    client.set_paused(false);
    let state = client.state();
    {
        let state = state.lock();
        assert_eq!(state.node("n1").unwrap().metrics.cpu, 0.1);
        assert!(state.events().is_empty());
        assert_eq!(state.history().node("n1").unwrap().cpu.len(), 1);
    }
    assert_eq!(client.signals().highlight(), None);

    // nothing is replayed; the next frame applies normally
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.5));
    assert!(wait_until(Duration::from_secs(1), || state.lock().node("n1").unwrap().metrics.cpu == 0.5).await);
    assert!(state.lock().events().is_empty());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cpu_update_feeds_node_history() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.10));
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.55));
    flush(&client, &connector, "m").await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.node_history["n1"].cpu, vec![10.0, 55.0]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sixty_first_sample_evicts_first() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    for i in 1..=61 {
        connector.push_json(&SyncMessageBuilder::node_update("n1", i as f64 / 100.0));
    }
    flush(&client, &connector, "m").await;

    let cpu = client.snapshot().node_history["n1"].cpu.clone();
    assert_eq!(cpu.len(), 60);
    assert_eq!(cpu[0], 2.0);
    assert_eq!(cpu[59], 61.0);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_highlight_reverts_after_three_seconds() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    connector.push_json(&SyncMessageBuilder::legacy(SyncMessageBuilder::load_redistributed("n4")));
    let signals = client.signals().clone();
    assert!(wait_until(Duration::from_millis(100), || signals.highlight().as_deref() == Some("n4")).await);

    sleep(Duration::from_millis(2800)).await;
    assert_eq!(signals.highlight().as_deref(), Some("n4"));
    sleep(Duration::from_millis(300)).await;
    assert_eq!(signals.highlight(), None);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_stop_ingestion() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;

    connector.push_frame("{\"type\": \"node_update\", ");
    connector.push_frame("not json at all");
    connector.push_json(&json!({"type": "node_update", "data": {"id": "broken"}}));
    connector.push_json(&json!({"type": "cluster_rebalanced", "data": {}}));
    connector.push_json(&SyncMessageBuilder::legacy(SyncMessageBuilder::security_event("e1", "n1", "high")));
    flush(&client, &connector, "after").await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(snapshot.events.len(), 1);
    assert_eq!(snapshot.events[0].id, "e1");
    assert_eq!(client.signals().connection(), ConnectionState::Connected);
    assert_eq!(connector.connect_count(), 1);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_severe_event_raises_alert() {
    let connector = MockConnector::new();
    let client = connected_client(&connector).await;
    let alerts = client.signals().watch_alert();

    connector.push_json(&SyncMessageBuilder::security_event("e-low", "n1", "low"));
    connector.push_json(&SyncMessageBuilder::security_event("e-crit", "n2", "critical"));
    flush(&client, &connector, "m").await;

    let alert = alerts.borrow().clone().unwrap();
    assert_eq!(alert.event_id, "e-crit");
    assert_eq!(alert.node_id, "n2");
    client.shutdown().await;
}
