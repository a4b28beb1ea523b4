//! Condition language for edge routing.
//!
//! A condition is parsed into a [`ParseTree`], lowered into a typed
//! [`Expr`] and evaluated by an [`Evaluator`] against the node's output,
//! status and state.
//!
//! ```text
//! $output.score > 3 and not retry
//! $status == "completed" || checks.is_ready
//! ```

pub mod ast;
pub mod cache;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use ast::{CompareOp, Expr, Literal, LogicalOp};
pub use cache::ConditionCache;
pub use error::{ExprError, Result};
pub use eval::{truthy, Evaluator};
pub use functions::{FunctionTable, PredicateFn};
pub use parser::{parse, ParseTree, MAX_DEPTH};

/// Parse and lower a condition in one step.
pub fn parse_expr(source: &str) -> Result<Expr> {
    ast::lower(&parser::parse(source)?)
}

/// Parse and evaluate a condition.
pub fn evaluate(
    source: &str,
    context: &serde_json::Map<String, serde_json::Value>,
    state_context: &serde_json::Map<String, serde_json::Value>,
    functions: &FunctionTable,
) -> Result<bool> {
    let expr = parse_expr(source)?;
    Evaluator::new(context, state_context, functions).evaluate(&expr)
}
