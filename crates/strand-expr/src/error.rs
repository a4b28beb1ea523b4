use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("Parse error at column {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Variable '{0}' not found in context")]
    UnresolvedVariable(String),

    #[error("Unknown {kind} operator: {op}")]
    UnknownOperator { kind: &'static str, op: String },

    #[error("Operator '{op}' requires numeric operands, got {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    /// The referenced predicate cannot be resolved.
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// The predicate was resolved but failed while running.
    #[error("Function execution failed: {path}: {message}")]
    FunctionFailed { path: String, message: String },
}

impl ExprError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExprError>;
