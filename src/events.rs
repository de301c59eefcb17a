use serde::Serialize;
use tokio::sync::broadcast;

use crate::reconcile::ReconcileSummary;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MigrationEvent {
    #[serde(rename_all = "camelCase")]
    MigrationCompleted {
        from_version: u32,
        to_version: u32,
        steps: Vec<&'static str>,
    },
    #[serde(rename_all = "camelCase")]
    IdsRemapped {
        from_version: u32,
        to_version: u32,
        summary: ReconcileSummary,
    },
}

/// Fan-out channel for upgrade notifications. Publishing with no subscribers
/// is fine.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MigrationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: MigrationEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
