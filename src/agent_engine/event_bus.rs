use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::{ActionKind, ActionStatus, ExecutionReport};

/// Progress of a running sequence, delivered to the per-call callback and
/// broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    AwaitingConfirmation {
        sequence_id: String,
        total: usize,
    },
    SequenceStarted {
        sequence_id: String,
        name: String,
        total: usize,
    },
    ActionStarted {
        sequence_id: String,
        index: usize,
        total: usize,
        kind: ActionKind,
        description: String,
        retry_count: u32,
    },
    ActionRetrying {
        sequence_id: String,
        index: usize,
        retry_count: u32,
        error: String,
    },
    ActionFinished {
        sequence_id: String,
        index: usize,
        status: ActionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SequenceFinished {
        report: ExecutionReport,
    },
}

pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Sends to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish(ProgressEvent::AwaitingConfirmation {
                sequence_id: "s".into(),
                total: 1
            }),
            0
        );
        let mut rx = bus.subscribe();
        let event = ProgressEvent::SequenceStarted {
            sequence_id: "s".into(),
            name: "demo".into(),
            total: 2,
        };
        assert_eq!(bus.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(ProgressEvent::ActionFinished {
            sequence_id: "s".into(),
            index: 0,
            status: ActionStatus::Completed,
            error: None,
        })
        .unwrap();
        assert_eq!(value["event"], "action_finished");
        assert_eq!(value["status"], "completed");
        assert!(value.get("error").is_none());
    }
}
