use thiserror::Error;
use uuid::Uuid;

use crate::types::NodeKind;

#[derive(Debug, Error)]
pub enum StrandError {
    // Lifecycle errors
    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Unsupported node kind: {0}")]
    UnsupportedKind(String),

    // Persistence errors
    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Condition errors
    #[error("Condition error: {0}")]
    Expr(#[from] strand_expr::ExprError),

    // Executor errors
    #[error("Execution exceeded max iterations ({0})")]
    MaxIterationsExceeded(usize),

    #[error("{failed} of {total} parallel branches failed: {message}")]
    BranchFailed {
        failed: usize,
        total: usize,
        message: String,
    },

    // Node errors
    #[error("{0}")]
    Actor(Box<ActorError>),

    #[error("Node not found: {kind}/{name}")]
    NodeNotFound { kind: NodeKind, name: String },

    #[error("Invalid input for {node}: {message}")]
    InvalidInput { node: String, message: String },

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Hook failed: {hook}: {message}")]
    Hook { hook: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrandError {
    /// The wrapped actor failure, if this is one.
    pub fn actor(&self) -> Option<&ActorError> {
        match self {
            StrandError::Actor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ActorError> for StrandError {
    fn from(e: ActorError) -> Self {
        StrandError::Actor(Box::new(e))
    }
}

/// A node actor failure carrying enough identity to correlate with
/// persisted state.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Actor {composite_id} failed{}: {message}", execution_suffix(.execution_id))]
pub struct ActorError {
    pub message: String,
    pub actor_id: Uuid,
    /// `node_actor/<kind>/<name>/<actor_id>`
    pub composite_id: String,
    pub node_kind: NodeKind,
    pub node_name: String,
    pub execution_id: Option<Uuid>,
}

fn execution_suffix(execution_id: &Option<Uuid>) -> String {
    match execution_id {
        Some(id) => format!(" in execution {}", id),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, StrandError>;
