use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use strand_core::types::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStatus {
    Running,
    /// Waiting on forked children.
    Suspended,
    Completed,
    Failed,
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorStatus::Running => "running",
            ExecutorStatus::Suspended => "suspended",
            ExecutorStatus::Completed => "completed",
            ExecutorStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The serialized form of one executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorState {
    pub execution_id: Uuid,
    /// The actor the executor is currently driving.
    pub node_actor_id: Uuid,
    pub status: ExecutorStatus,
    #[serde(default)]
    pub child_executor_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub iteration_count: usize,
    #[serde(default)]
    pub is_child: bool,
    /// Every actor this executor has driven, in creation order.
    #[serde(default)]
    pub actor_ids: Vec<Uuid>,
    /// Input about to be fed to `node_actor_id`, kept for crash resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_input: Option<Payload>,
}

/// A whole executor tree keyed by execution id.
pub type Snapshot = BTreeMap<String, ExecutorState>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorInput {
    pub execution_id: Uuid,
    pub node_actor_id: Uuid,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOutput {
    pub execution_id: Uuid,
    pub node_actor_id: Uuid,
    pub output: Payload,
    /// The branch has no further successors.
    pub exit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchFailure {
    pub execution_id: Uuid,
    pub error: String,
}

/// Outcome of a parallel join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinReport {
    pub outputs: Vec<Payload>,
    pub failures: Vec<BranchFailure>,
}

impl JoinReport {
    pub fn total(&self) -> usize {
        self.outputs.len() + self.failures.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
