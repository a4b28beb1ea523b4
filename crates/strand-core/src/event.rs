use uuid::Uuid;

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StepStarted {
        execution_id: Uuid,
        actor_id: Uuid,
        node_name: String,
        iteration: usize,
    },
    /// Sequential continuation from one node to the next.
    Transition {
        execution_id: Uuid,
        from_node: String,
        to_node: String,
    },
    Forked {
        execution_id: Uuid,
        children: Vec<Uuid>,
    },
    Joined {
        execution_id: Uuid,
        outputs: usize,
        failures: usize,
    },
    BranchFailed {
        execution_id: Uuid,
        child_id: Uuid,
        error: String,
    },
    ExecutorCompleted {
        execution_id: Uuid,
    },
    ExecutorFailed {
        execution_id: Uuid,
        error: String,
    },
    StateSaved {
        execution_id: Uuid,
        executors: usize,
    },
    Restored {
        execution_id: Uuid,
        executors: usize,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
