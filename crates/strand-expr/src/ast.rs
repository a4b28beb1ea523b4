use std::fmt;

use serde_json::Value;

use crate::error::{ExprError, Result};
use crate::parser::ParseTree;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Str(String),
    Number(f64),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::String(s.clone()),
            Literal::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Typed condition AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A variable, optionally `$`-prefixed and dotted (`$output.count`).
    Variable(String),
    Comparison {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Dotted path naming a registered predicate.
    FunctionRef(String),
}

fn compare_op(op: &str) -> Option<CompareOp> {
    match op {
        "==" => Some(CompareOp::Eq),
        "!=" => Some(CompareOp::NotEq),
        ">" => Some(CompareOp::Gt),
        "<" => Some(CompareOp::Lt),
        _ => None,
    }
}

fn logical_op(op: &str) -> Option<LogicalOp> {
    match op {
        "&&" | "and" => Some(LogicalOp::And),
        "||" | "or" => Some(LogicalOp::Or),
        _ => None,
    }
}

/// Lower a parse tree into the typed AST.
pub fn lower(tree: &ParseTree) -> Result<Expr> {
    match tree {
        ParseTree::Bool(b) => Ok(Expr::Literal(Literal::Bool(*b))),
        ParseTree::Number(n) => Ok(Expr::Literal(Literal::Number(*n))),
        ParseTree::Str(s) => Ok(Expr::Literal(Literal::Str(s.clone()))),
        ParseTree::Group(inner) => lower(inner),
        ParseTree::Name(segments) => {
            let joined = segments.join(".");
            let is_variable = segments.len() == 1 || joined.starts_with('$');
            Ok(if is_variable {
                Expr::Variable(joined)
            } else {
                Expr::FunctionRef(joined)
            })
        }
        ParseTree::Unary { op, operand } => match op.as_str() {
            "!" | "not" => Ok(Expr::Not(Box::new(lower(operand)?))),
            other => Err(ExprError::UnknownOperator {
                kind: "unary",
                op: other.to_string(),
            }),
        },
        ParseTree::Binary { op, left, right } => {
            let left = Box::new(lower(left)?);
            let right = Box::new(lower(right)?);
            if let Some(op) = compare_op(op) {
                Ok(Expr::Comparison { op, left, right })
            } else if let Some(op) = logical_op(op) {
                Ok(Expr::Logical { op, left, right })
            } else {
                Err(ExprError::UnknownOperator {
                    kind: "binary",
                    op: op.clone(),
                })
            }
        }
    }
}
