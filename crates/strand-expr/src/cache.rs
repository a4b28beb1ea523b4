use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::ast::Expr;
use crate::error::Result;

/// Parsed conditions keyed by their source text.
///
/// Failed parses are not cached, so a broken condition reports its error
/// every time it is evaluated.
#[derive(Debug, Default)]
pub struct ConditionCache {
    entries: Mutex<HashMap<String, Arc<Expr>>>,
}

impl ConditionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&self, source: &str) -> Result<Arc<Expr>> {
        if let Some(expr) = self.lock().get(source) {
            return Ok(expr.clone());
        }
        let expr = Arc::new(crate::parse_expr(source)?);
        debug!(condition = %source, "Parsed edge condition");
        self.lock().insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Expr>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
