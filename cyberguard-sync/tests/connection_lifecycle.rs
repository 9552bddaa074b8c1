//! Push channel lifecycle on a paused clock, driven through the mock connector

use cyberguard_devkit::{wait_until, MockConnector, SyncMessageBuilder};
use cyberguard_sync::{ConnectionState, SyncClient, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn client(connector: &MockConnector) -> SyncClient {
    SyncClient::with_connector(SyncConfig::default(), Arc::new(connector.clone())).unwrap()
}

async fn wait_connected(client: &SyncClient) {
    let signals = client.signals().clone();
    assert!(wait_until(Duration::from_secs(1), || signals.connection() == ConnectionState::Connected).await);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let connector = MockConnector::new();
    let client = client(&connector);

    assert!(client.connect());
    assert!(!client.connect());
    wait_connected(&client).await;
    assert!(!client.connect());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.attempted_urls(), vec!["ws://localhost:8010/ws"]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_reconnect_after_close() {
    let connector = MockConnector::new();
    let client = client(&connector);
    client.connect();
    wait_connected(&client).await;

    connector.close();
    sleep(Duration::from_millis(1400)).await;
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(client.signals().connection(), ConnectionState::Disconnected);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.connect_count(), 2);
    assert_eq!(client.signals().connection(), ConnectionState::Connected);

    // the reopened channel stays up, nothing else is scheduled
    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connect_count(), 2);

    let health = client.connection_health();
    assert_eq!(health.reconnects, 1);
    assert_eq!(health.attempts, 2);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_then_resets_on_open() {
    let connector = MockConnector::new();
    connector.set_refuse(true);
    let client = client(&connector);
    client.connect();

    // attempts at 0, 1.5, 4.5 and 10.5 seconds
    sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.connect_count(), 1);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(connector.connect_count(), 2);
    sleep(Duration::from_millis(3000)).await;
    assert_eq!(connector.connect_count(), 3);
    assert!(client.connection_health().last_error.is_some());

    connector.set_refuse(false);
    sleep(Duration::from_millis(6000)).await;
    assert_eq!(connector.connect_count(), 4);
    assert_eq!(client.signals().connection(), ConnectionState::Connected);

    // back to the initial delay after a successful open
    connector.close();
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(connector.connect_count(), 5);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_after_teardown() {
    let connector = MockConnector::new();
    let client = client(&connector);
    client.connect();
    wait_connected(&client).await;

    // reconnect timer is pending when teardown happens
    connector.close();
    sleep(Duration::from_millis(1000)).await;
    client.shutdown().await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_count(), 1);
    assert!(!client.connect());
    assert_eq!(client.signals().connection(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_closes_live_channel() {
    let connector = MockConnector::new();
    let client = client(&connector);
    client.connect();
    wait_connected(&client).await;
    assert!(connector.client_attached());

    client.shutdown().await;
    assert!(!connector.client_attached());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping_every_interval() {
    let connector = MockConnector::new();
    let client = client(&connector);
    client.connect();
    wait_connected(&client).await;

    sleep(Duration::from_millis(14_900)).await;
    assert!(connector.sent_frames().is_empty());
    sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.sent_frames(), vec!["ping"]);
    sleep(Duration::from_secs(15)).await;
    assert_eq!(connector.sent_frames(), vec!["ping", "ping"]);

    // pong replies carry no state
    let revision = client.signals().revision();
    connector.push_frame("pong");
    connector.push_json(&SyncMessageBuilder::node_update("n1", 0.2));
    let state = client.state();
    assert!(wait_until(Duration::from_secs(1), || state.lock().node_count() == 1).await);
    assert_eq!(client.signals().revision(), revision + 1);

    // the interval dies with the session
    client.shutdown().await;
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.sent_frames().len(), 2);
}
