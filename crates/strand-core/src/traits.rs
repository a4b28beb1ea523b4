use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::*;

/// Chat model backing LLM nodes.
pub trait ChatModel: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Send the conversation and receive the assistant's reply.
    fn chat<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<ChatMessage>>;
}

/// Capabilities shared by every node kind.
///
/// A node is compiled once and then shared read-only between runs; all
/// per-run data lives in the [`NodeState`] it hands out.
pub trait NodeSpec: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// Outgoing edges. Model-backed nodes route by tool calls instead.
    fn edges(&self) -> &[EdgeSpec] {
        &[]
    }

    fn is_model_backed(&self) -> bool {
        self.kind() == NodeKind::Llm
    }

    fn compile(&self) -> Result<()> {
        Ok(())
    }

    fn is_compiled(&self) -> bool {
        true
    }

    fn new_state(&self) -> NodeState {
        NodeState::new(self.kind(), self.name())
    }
}

/// A model-backed node. The input has already been appended to
/// `state.messages` when `invoke` runs.
pub trait LlmNode: NodeSpec {
    /// Tools offered to the model.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    fn invoke<'a>(
        &'a self,
        model: &'a dyn ChatModel,
        state: &'a mut NodeState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>>;
}

/// A node executing one tool call.
pub trait ToolNode: NodeSpec {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    fn invoke<'a>(
        &'a self,
        call: ToolCall,
        state: &'a mut NodeState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>>;
}

/// A node running plain code over its input.
pub trait FunctionNode: NodeSpec {
    fn invoke<'a>(
        &'a self,
        input: Payload,
        state: &'a mut NodeState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>>;
}

/// A shared reference to a compiled node, tagged by kind.
#[derive(Clone)]
pub enum NodeRef {
    Llm(Arc<dyn LlmNode>),
    Tool(Arc<dyn ToolNode>),
    Function(Arc<dyn FunctionNode>),
}

macro_rules! with_spec {
    ($self:expr, $n:ident => $body:expr) => {
        match $self {
            NodeRef::Llm($n) => $body,
            NodeRef::Tool($n) => $body,
            NodeRef::Function($n) => $body,
        }
    };
}

impl NodeRef {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Llm(_) => NodeKind::Llm,
            NodeRef::Tool(_) => NodeKind::Tool,
            NodeRef::Function(_) => NodeKind::Function,
        }
    }

    pub fn name(&self) -> &str {
        with_spec!(self, n => n.name())
    }

    pub fn edges(&self) -> &[EdgeSpec] {
        with_spec!(self, n => n.edges())
    }

    pub fn is_model_backed(&self) -> bool {
        with_spec!(self, n => n.is_model_backed())
    }

    pub fn compile(&self) -> Result<()> {
        with_spec!(self, n => n.compile())
    }

    pub fn is_compiled(&self) -> bool {
        with_spec!(self, n => n.is_compiled())
    }

    pub fn new_state(&self) -> NodeState {
        with_spec!(self, n => n.new_state())
    }

    /// Same node identity, compared by kind and name.
    pub fn same_node(&self, other: &NodeRef) -> bool {
        self.kind() == other.kind() && self.name() == other.name()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({}/{})", self.kind(), self.name())
    }
}

/// A successor produced by an execution: the node to run and its input.
#[derive(Debug, Clone)]
pub struct NextNode {
    pub node: NodeRef,
    pub input: Payload,
}

/// Durable key-value persistence for run snapshots and actor state.
///
/// Every operation has a non-blocking and a blocking form; both act on
/// the same backing store.
pub trait StateStorage: Send + Sync + 'static {
    fn save_executor_state(&self, execution_id: Uuid, state: Value) -> BoxFuture<'_, Result<()>>;

    fn load_executor_state(&self, execution_id: Uuid) -> BoxFuture<'_, Result<Option<Value>>>;

    fn save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> BoxFuture<'_, Result<()>>;

    fn load_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Value>>>;

    /// Remove the snapshot and every actor state of an execution.
    fn delete_execution_state(&self, execution_id: Uuid) -> BoxFuture<'_, Result<()>>;

    fn blocking_save_executor_state(&self, execution_id: Uuid, state: Value) -> Result<()>;

    fn blocking_load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>>;

    fn blocking_save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> Result<()>;

    fn blocking_load_actor_state(&self, execution_id: Uuid, actor_id: Uuid)
        -> Result<Option<Value>>;

    fn blocking_delete_execution_state(&self, execution_id: Uuid) -> Result<()>;
}
