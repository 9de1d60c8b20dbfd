use crate::execution::{Direction, UnitStatus};

/// Execution event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// A run started with the given number of planned units.
    RunStarted { run_id: String, unit_count: usize },
    /// A unit started executing.
    UnitStarted {
        item: String,
        direction: Direction,
        filter_id: String,
    },
    /// A unit finished (succeeded, failed, or was skipped).
    UnitFinished {
        item: String,
        direction: Direction,
        filter_id: String,
        status: UnitStatus,
        elapsed_ms: u64,
    },
    /// A unit installed new resources for its neighbors.
    ResourcesProduced { item: String, count: usize },
    /// Free-form diagnostic attached to an item.
    Diagnostic { item: String, message: String },
    /// The run finished.
    RunFinished { run_id: String, succeeded: bool },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
