use crate::shutdown::ShutdownListener;
use crate::signals::Signals;
use crate::store::{DashboardState, Shared};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Append one cluster trend sample every `every` until teardown
pub fn spawn_trend_sampler(
    state: Shared<DashboardState>,
    signals: Signals,
    every: Duration,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    // empty node map: nothing to average
                    if let Some(sample) = state.lock().sample_cluster() {
                        trace!("cluster sample {:?}", sample);
                        signals.bump_revision();
                    }
                }
            }
        }
        debug!("Trend sampler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::protocol::SyncMessage;
    use crate::shutdown::Shutdown;
    use crate::store::new_shared;

    fn node_message() -> SyncMessage {
        serde_json::from_value(serde_json::json!({
            "type": "init",
            "data": [
                {"id": "a", "state": "healthy", "cpu": 0.2, "mem": 0.1, "net_in": 10.0, "net_out": 1.0},
                {"id": "b", "state": "healthy", "cpu": 0.4, "mem": 0.1, "net_in": 20.0, "net_out": 2.0}
            ]
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_appends_every_interval() {
        let state = new_shared(DashboardState::new(&SyncConfig::default()));
        let shutdown = Shutdown::new();
        let handle = spawn_trend_sampler(state.clone(), Signals::new(), Duration::from_secs(3), shutdown.listener());

        // empty map, no sample
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(state.lock().history().cluster().cpu.is_empty());

        state.lock().apply(node_message());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(state.lock().history().cluster().series().cpu, vec![30.0, 30.0]);
        assert_eq!(state.lock().history().cluster().series().network_in, vec![30.0, 30.0]);

        shutdown.trigger();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(state.lock().history().cluster().cpu.len(), 2);
    }
}
