use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use strand_expr::FunctionTable;
use tracing::debug;

use crate::error::{Result, StrandError};
use crate::plugin::Plugin;
use crate::traits::{FunctionNode, LlmNode, NodeRef, ToolNode};
use crate::types::{NodeKind, ToolDefinition};

/// Compiled nodes keyed by kind and name, plus the predicate table and
/// plugins an engine run needs.
///
/// Passed explicitly to actors and executors; there is no global registry.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<(NodeKind, String), NodeRef>,
    functions: FunctionTable,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. A second node with the same kind and name is rejected.
    pub fn add(&mut self, node: NodeRef) -> Result<()> {
        let key = (node.kind(), node.name().to_string());
        if self.nodes.contains_key(&key) {
            return Err(StrandError::Config(format!(
                "Node already registered: {}/{}",
                key.0, key.1
            )));
        }
        debug!(kind = %key.0, name = %key.1, "Registered node");
        self.nodes.insert(key, node);
        Ok(())
    }

    pub fn add_llm(&mut self, node: Arc<dyn LlmNode>) -> Result<()> {
        self.add(NodeRef::Llm(node))
    }

    pub fn add_tool(&mut self, node: Arc<dyn ToolNode>) -> Result<()> {
        self.add(NodeRef::Tool(node))
    }

    pub fn add_function(&mut self, node: Arc<dyn FunctionNode>) -> Result<()> {
        self.add(NodeRef::Function(node))
    }

    pub fn get(&self, kind: NodeKind, name: &str) -> Option<NodeRef> {
        self.nodes.get(&(kind, name.to_string())).cloned()
    }

    pub fn lookup(&self, kind: NodeKind, name: &str) -> Result<NodeRef> {
        self.get(kind, name).ok_or_else(|| StrandError::NodeNotFound {
            kind,
            name: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Definitions of every registered tool node, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .nodes
            .values()
            .filter_map(|n| match n {
                NodeRef::Tool(t) => Some(t.definition()),
                _ => None,
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Register a predicate callable from edge conditions by dotted path.
    pub fn register_function<F>(&mut self, path: impl Into<String>, f: F)
    where
        F: Fn() -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.register(path, f);
    }

    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        debug!(plugin = plugin.name(), "Registered plugin");
        self.plugins.push(plugin);
    }

    /// Plugins that apply to a node kind, in registration order.
    pub fn plugins_for(&self, kind: NodeKind) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(|p| p.applies_to(kind))
            .cloned()
            .collect()
    }
}
