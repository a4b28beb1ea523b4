//! Mocks and fixtures shared by the Strand test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use strand_core::error::{Result, StrandError};
use strand_core::traits::{ChatModel, FunctionNode, LlmNode, NodeRef, NodeSpec, ToolNode};
use strand_core::types::{
    ChatMessage, EdgeSpec, ExecutionContext, NodeKind, NodeState, Payload, ToolCall,
    ToolDefinition,
};
use strand_core::NodeRegistry;
use strand_store::SqliteStateStorage;

type NodeFn = dyn Fn(Payload, &mut NodeState, &ExecutionContext) -> Result<Payload> + Send + Sync;
type ToolFn = dyn Fn(ToolCall, &mut NodeState) -> Result<Payload> + Send + Sync;

/// A function node backed by a closure.
pub struct FnNode {
    name: String,
    f: Box<NodeFn>,
    edges: Vec<EdgeSpec>,
    delay: Option<Duration>,
    compiled: AtomicBool,
}

impl FnNode {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Payload, &mut NodeState, &ExecutionContext) -> Result<Payload>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
            edges: Vec::new(),
            delay: None,
            compiled: AtomicBool::new(true),
        }
    }

    /// Returns its input unchanged.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, |input, _, _| Ok(input))
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    /// Sleep before each invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Start uncompiled; `compile()` flips the flag.
    pub fn uncompiled(self) -> Self {
        self.compiled.store(false, Ordering::SeqCst);
        self
    }
}

impl NodeSpec for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Function
    }

    fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    fn compile(&self) -> Result<()> {
        self.compiled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_compiled(&self) -> bool {
        self.compiled.load(Ordering::SeqCst)
    }
}

impl FunctionNode for FnNode {
    fn invoke<'a>(
        &'a self,
        input: Payload,
        state: &'a mut NodeState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.f)(input, state, ctx)
        })
    }
}

/// A tool node backed by a closure.
pub struct FnTool {
    name: String,
    f: Box<ToolFn>,
    edges: Vec<EdgeSpec>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ToolCall, &mut NodeState) -> Result<Payload> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
            edges: Vec::new(),
        }
    }

    /// Returns the call arguments as JSON.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, |call, _| Ok(Payload::Json(call.args)))
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }
}

impl NodeSpec for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Tool
    }

    fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }
}

impl ToolNode for FnTool {
    fn invoke<'a>(
        &'a self,
        call: ToolCall,
        state: &'a mut NodeState,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>> {
        let result = (self.f)(call, state);
        Box::pin(async move { result })
    }
}

/// An LLM node that sends its history to the bound model.
pub struct ChatNode {
    name: String,
    tools: Vec<ToolDefinition>,
}

impl ChatNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

impl NodeSpec for ChatNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Llm
    }
}

impl LlmNode for ChatNode {
    fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    fn invoke<'a>(
        &'a self,
        model: &'a dyn ChatModel,
        state: &'a mut NodeState,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            let tools = self.tools();
            let reply = model.chat(state.messages.clone(), &tools).await?;
            Ok(Payload::Message(reply))
        })
    }
}

/// A chat model replaying scripted replies in order.
///
/// Once the script runs out it answers `"done"`, or fails when strict.
pub struct MockChatModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    strict: bool,
}

impl MockChatModel {
    pub fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The message history sent with each call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChatModel for MockChatModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn chat<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        _tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<ChatMessage>> {
        self.calls.lock().unwrap().push(messages);
        let next = self.replies.lock().unwrap().pop_front();
        let result = match next {
            Some(reply) => Ok(reply),
            None if self.strict => Err(StrandError::NodeExecution {
                node: "mock".into(),
                message: "no scripted replies left".into(),
            }),
            None => Ok(ChatMessage::assistant_text("done")),
        };
        Box::pin(async move { result })
    }
}

/// A registry holding `nodes`.
pub fn registry(nodes: Vec<NodeRef>) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for node in nodes {
        registry.add(node).unwrap();
    }
    registry
}

/// A tool definition with an open object schema.
pub fn tool_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({"type": "object"}),
    }
}

/// SQLite storage in a fresh temporary directory. Keep the directory alive
/// for as long as the storage is used.
pub fn sqlite_storage() -> (tempfile::TempDir, Arc<SqliteStateStorage>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStateStorage::open(&dir.path().join("strand.db")).unwrap();
    (dir, Arc::new(storage))
}

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("strand=debug"))
        .with_test_writer()
        .try_init();
}
