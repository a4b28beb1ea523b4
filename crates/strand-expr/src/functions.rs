use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ExprError, Result};

/// A zero-argument predicate callable from a condition by dotted path.
pub type PredicateFn = Arc<dyn Fn() -> std::result::Result<Value, String> + Send + Sync>;

/// Table of predicates addressable from edge conditions.
///
/// Conditions like `checks.is_ready` look the path up here and call it
/// with no arguments.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, PredicateFn>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, path: impl Into<String>, f: F)
    where
        F: Fn() -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(path.into(), Arc::new(f));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.functions.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Resolve and call a predicate.
    pub fn call(&self, path: &str) -> Result<Value> {
        let f = self
            .functions
            .get(path)
            .ok_or_else(|| ExprError::InvalidSpec(format!("Cannot resolve function '{}'", path)))?;
        f().map_err(|message| ExprError::FunctionFailed {
            path: path.to_string(),
            message,
        })
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.functions.keys().collect();
        paths.sort();
        f.debug_struct("FunctionTable")
            .field("paths", &paths)
            .finish()
    }
}
