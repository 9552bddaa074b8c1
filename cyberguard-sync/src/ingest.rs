use crate::models::Severity;
use crate::protocol::{decode_frame, Frame};
use crate::signals::{Alert, Signals};
use crate::store::{Applied, DashboardState, Shared};
use std::time::Duration;
use tracing::{debug, trace};

/// Turns raw push frames into state updates and signal pulses
#[derive(Clone)]
pub struct Ingestor {
    state: Shared<DashboardState>,
    signals: Signals,
    highlight_for: Duration,
    alert_on_severe: bool,
}

impl Ingestor {
    pub fn new(state: Shared<DashboardState>, signals: Signals, highlight_for: Duration, alert_on_severe: bool) -> Self {
        Self {
            state,
            signals,
            highlight_for,
            alert_on_severe,
        }
    }

    /// Handle one text frame. Malformed frames are logged and dropped, they
    /// never reach the state or tear the channel down.
    pub fn handle_text(&self, text: &str) -> Option<Applied> {
        let message = match decode_frame(text) {
            Ok(Frame::Message(message)) => message,
            Ok(Frame::KeepAlive) => {
                trace!("keep-alive reply");
                return None;
            }
            Err(e) => {
                debug!("Dropping malformed frame: {}", e);
                return None;
            }
        };

        let kind = message.kind();
        let applied = self.state.lock().apply(message);
        trace!("{} -> {:?}", kind, applied);

        match &applied {
            Applied::Paused | Applied::Ignored => return Some(applied),
            Applied::Highlight(node_id) => {
                self.signals.pulse_highlight(node_id.clone(), self.highlight_for);
            }
            Applied::Event(event) if self.alert_on_severe && event.severity >= Severity::High => {
                self.signals.raise_alert(Alert {
                    event_id: event.id.clone(),
                    node_id: event.node_id.clone(),
                    severity: event.severity,
                });
            }
            _ => {}
        }

        self.signals.bump_revision();
        Some(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::store::new_shared;
    use serde_json::json;

    fn ingestor(alerts: bool) -> (Ingestor, Shared<DashboardState>, Signals) {
        let state = new_shared(DashboardState::new(&SyncConfig::default()));
        let signals = Signals::new();
        let ingestor = Ingestor::new(state.clone(), signals.clone(), Duration::from_secs(3), alerts);
        (ingestor, state, signals)
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let (ingestor, state, signals) = ingestor(false);
        assert!(ingestor.handle_text("{\"type\": \"node_update\", \"data\": 12").is_none());
        assert!(ingestor.handle_text("pong").is_none());
        assert_eq!(state.lock().node_count(), 0);
        assert_eq!(signals.revision(), 0);

        let applied = ingestor.handle_text(
            &json!({"type": "node_update", "data": {"id": "n1", "state": "healthy", "cpu": 0.1, "mem": 0.2}}).to_string(),
        );
        assert_eq!(applied, Some(Applied::Nodes(1)));
        assert_eq!(signals.revision(), 1);
    }

    #[tokio::test]
    async fn test_redistribution_pulses_highlight() {
        let (ingestor, _, signals) = ingestor(false);
        ingestor.handle_text(&json!({"type": "load_redistributed", "data": {"node_id": "n3"}}).to_string());
        assert_eq!(signals.highlight().as_deref(), Some("n3"));
    }

    #[tokio::test]
    async fn test_paused_redistribution_does_not_highlight() {
        let (ingestor, state, signals) = ingestor(false);
        state.lock().set_paused(true);
        let applied = ingestor.handle_text(&json!({"event": "load_redistributed", "data": {"node_id": "n3"}}).to_string());
        assert_eq!(applied, Some(Applied::Paused));
        assert_eq!(signals.highlight(), None);
        assert_eq!(signals.revision(), 0);
    }

    #[tokio::test]
    async fn test_severe_event_raises_alert() {
        let (ingestor, _, signals) = ingestor(true);
        let alerts = signals.watch_alert();
        ingestor.handle_text(
            &json!({"type": "security_event", "data": {"id": "e1", "node_id": "n1", "type": "ddos", "severity": "low", "timestamp": 1.0}}).to_string(),
        );
        assert!(alerts.borrow().is_none());

        ingestor.handle_text(
            &json!({"type": "security_event", "data": {"id": "e2", "node_id": "n1", "type": "ddos", "severity": "critical", "timestamp": 2.0}}).to_string(),
        );
        assert_eq!(alerts.borrow().as_ref().map(|a| a.event_id.as_str()), Some("e2"));
    }
}
