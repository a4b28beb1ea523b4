use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a node actor.
///
/// `Idle -> Initializing -> Ready -> Executing -> Completed`, with
/// `Completed -> Executing` for repeated runs and `Executing -> Ready`
/// for explicit recovery. `Shutdown` is terminal and reachable from
/// every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeActorStatus {
    Idle,
    Initializing,
    Ready,
    Executing,
    Completed,
    Shutdown,
}

impl NodeActorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeActorStatus::Idle => "idle",
            NodeActorStatus::Initializing => "initializing",
            NodeActorStatus::Ready => "ready",
            NodeActorStatus::Executing => "executing",
            NodeActorStatus::Completed => "completed",
            NodeActorStatus::Shutdown => "shutdown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == NodeActorStatus::Shutdown
    }

    /// Only `Ready` and `Completed` actors accept new work.
    pub fn can_execute(&self) -> bool {
        matches!(self, NodeActorStatus::Ready | NodeActorStatus::Completed)
    }

    pub fn can_transition_to(&self, next: NodeActorStatus) -> bool {
        use NodeActorStatus::*;
        match (*self, next) {
            (Shutdown, _) => false,
            (_, Shutdown) => true,
            (Idle, Initializing)
            | (Initializing, Ready)
            | (Ready, Executing)
            | (Completed, Executing)
            | (Executing, Completed)
            | (Executing, Ready) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NodeActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::NodeActorStatus::*;
    use super::*;

    const ALL: [NodeActorStatus; 6] = [Idle, Initializing, Ready, Executing, Completed, Shutdown];

    #[test]
    fn test_shutdown_reachable_from_non_terminal() {
        for status in ALL {
            assert_eq!(status.can_transition_to(Shutdown), status != Shutdown);
        }
    }

    #[test]
    fn test_only_ready_or_completed_execute() {
        for status in ALL {
            assert_eq!(
                status.can_transition_to(Executing),
                matches!(status, Ready | Completed)
            );
            assert_eq!(status.can_execute(), matches!(status, Ready | Completed));
        }
    }

    #[test]
    fn test_no_skipping_initialization() {
        assert!(!Idle.can_transition_to(Ready));
        assert!(!Idle.can_transition_to(Executing));
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(serde_json::to_string(&Executing).unwrap(), "\"executing\"");
        assert_eq!(Completed.to_string(), "completed");
    }
}
