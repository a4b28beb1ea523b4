//! Node actor: one node instance with identity, lifecycle and hooks.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strand_expr::ConditionCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use strand_core::error::{ActorError, Result, StrandError};
use strand_core::hooks::{
    ActorInfo, HookSet, PostExecutionHook, PostHookData, PreExecutionHook, PreHookData,
};
use strand_core::traits::{ChatModel, NextNode, NodeRef};
use strand_core::types::{ExecutionContext, NodeKind, NodeState, Payload, ToolCall};
use strand_core::NodeRegistry;

use crate::routing;
use crate::status::NodeActorStatus;

/// Output of one actor execution.
#[derive(Debug, Clone)]
pub struct ActorResult {
    pub output: Payload,
    pub next_nodes: Vec<NextNode>,
}

/// Serialized actor state as written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub actor_id: Uuid,
    pub node_kind: NodeKind,
    pub node_name: String,
    pub status: NodeActorStatus,
    pub node_state: NodeState,
}

/// Point-in-time view of an actor.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub actor_id: Uuid,
    pub composite_id: String,
    pub node_kind: NodeKind,
    pub node_name: String,
    pub status: NodeActorStatus,
    pub last_error: Option<ActorError>,
    pub message_count: usize,
}

struct ActorInner {
    status: NodeActorStatus,
    state: NodeState,
    last_error: Option<ActorError>,
    hooks: HookSet,
}

/// Wraps a shared compiled node for one run.
///
/// At most one execution is in flight per actor; concurrent callers of
/// [`NodeActor::execute`] queue on the execution lock.
pub struct NodeActor {
    id: Uuid,
    node: NodeRef,
    registry: Arc<NodeRegistry>,
    model: Option<Arc<dyn ChatModel>>,
    inner: Mutex<ActorInner>,
    exec_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    conditions: ConditionCache,
}

impl NodeActor {
    pub fn new(
        node: NodeRef,
        registry: Arc<NodeRegistry>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), node, registry, model)
    }

    pub fn with_id(
        id: Uuid,
        node: NodeRef,
        registry: Arc<NodeRegistry>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        let state = node.new_state();
        Self {
            id,
            node,
            registry,
            model,
            inner: Mutex::new(ActorInner {
                status: NodeActorStatus::Idle,
                state,
                last_error: None,
                hooks: HookSet::new(),
            }),
            exec_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            conditions: ConditionCache::new(),
        }
    }

    /// Whether a saved actor of this node may be rehydrated as-is.
    ///
    /// Model-backed actors carry conversation history worth keeping even
    /// mid-execution; other kinds restore only from `Ready`.
    pub fn can_restore(node: &NodeRef, status: NodeActorStatus) -> bool {
        if node.is_model_backed() {
            matches!(
                status,
                NodeActorStatus::Ready | NodeActorStatus::Executing | NodeActorStatus::Completed
            )
        } else {
            status == NodeActorStatus::Ready
        }
    }

    /// Rehydrate an actor from a snapshot when eligible, else start fresh
    /// under the saved id.
    pub fn create_or_restore(
        node: NodeRef,
        registry: Arc<NodeRegistry>,
        model: Option<Arc<dyn ChatModel>>,
        saved: Option<ActorSnapshot>,
    ) -> Result<Self> {
        let Some(saved) = saved else {
            return Ok(Self::new(node, registry, model));
        };

        if saved.node_kind != node.kind() || saved.node_name != node.name() {
            return Err(StrandError::Restore(format!(
                "Actor {} was saved for {}/{} but resolved to {}/{}",
                saved.actor_id,
                saved.node_kind,
                saved.node_name,
                node.kind(),
                node.name()
            )));
        }

        let actor = Self::with_id(saved.actor_id, node, registry, model);
        if Self::can_restore(&actor.node, saved.status) {
            // Compile eagerly: a restored actor skips initialize().
            if !actor.node.is_compiled() {
                actor.node.compile()?;
            }
            let plugin_hooks = actor.plugin_hooks()?;
            let mut inner = actor.inner();
            inner.status = saved.status;
            inner.state = saved.node_state;
            inner.hooks = plugin_hooks;
            drop(inner);
            debug!(actor_id = %actor.id, status = %saved.status, "Restored node actor");
        } else {
            debug!(
                actor_id = %actor.id,
                status = %saved.status,
                "Saved actor not restorable, starting fresh"
            );
        }
        Ok(actor)
    }

    fn inner(&self) -> MutexGuard<'_, ActorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn composite_id(&self) -> String {
        format!(
            "node_actor/{}/{}/{}",
            self.node.kind().short_name(),
            self.node.name(),
            self.id
        )
    }

    pub fn info(&self) -> ActorInfo {
        ActorInfo {
            actor_id: self.id,
            composite_id: self.composite_id(),
            node_kind: self.node.kind(),
            node_name: self.node.name().to_string(),
        }
    }

    pub fn status(&self) -> NodeActorStatus {
        self.inner().status
    }

    pub fn last_error(&self) -> Option<ActorError> {
        self.inner().last_error.clone()
    }

    /// A copy of the actor's node state.
    pub fn state(&self) -> NodeState {
        self.inner().state.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn status_report(&self) -> StatusReport {
        let inner = self.inner();
        StatusReport {
            actor_id: self.id,
            composite_id: self.composite_id(),
            node_kind: self.node.kind(),
            node_name: self.node.name().to_string(),
            status: inner.status,
            last_error: inner.last_error.clone(),
            message_count: inner.state.messages.len(),
        }
    }

    pub fn add_pre_hook(&self, hook: Arc<dyn PreExecutionHook>) {
        self.inner().hooks.add_pre(hook);
    }

    pub fn add_post_hook(&self, hook: Arc<dyn PostExecutionHook>) {
        self.inner().hooks.add_post(hook);
    }

    pub fn serialize_state(&self) -> ActorSnapshot {
        let inner = self.inner();
        ActorSnapshot {
            actor_id: self.id,
            node_kind: self.node.kind(),
            node_name: self.node.name().to_string(),
            status: inner.status,
            node_state: inner.state.clone(),
        }
    }

    fn actor_error(&self, e: &StrandError, execution_id: Option<Uuid>) -> ActorError {
        if let Some(existing) = e.actor() {
            return existing.clone();
        }
        ActorError {
            message: e.to_string(),
            actor_id: self.id,
            composite_id: self.composite_id(),
            node_kind: self.node.kind(),
            node_name: self.node.name().to_string(),
            execution_id,
        }
    }

    fn conflict(&self, action: &str, status: NodeActorStatus) -> StrandError {
        StrandError::StateConflict(format!(
            "Cannot {} {} while {}",
            action,
            self.composite_id(),
            status
        ))
    }

    fn plugin_hooks(&self) -> Result<HookSet> {
        let info = self.info();
        let mut hooks = HookSet::new();
        for plugin in self.registry.plugins_for(self.node.kind()) {
            plugin.install(&info, &mut hooks)?;
            debug!(plugin = plugin.name(), actor_id = %self.id, "Installed plugin hooks");
        }
        Ok(hooks)
    }

    fn prepare(&self) -> Result<HookSet> {
        if !self.node.is_compiled() {
            self.node.compile()?;
        }
        if self.node.is_model_backed() && self.model.is_none() {
            return Err(StrandError::MissingDependency(format!(
                "Model-backed node '{}' has no chat model bound",
                self.node.name()
            )));
        }
        self.plugin_hooks()
    }

    /// Compile the node, check preconditions and install plugin hooks.
    ///
    /// Legal only from `Idle`. On failure the actor stays `Initializing`
    /// with the error recorded.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut inner = self.inner();
            if inner.status != NodeActorStatus::Idle {
                return Err(self.conflict("initialize", inner.status));
            }
            inner.status = NodeActorStatus::Initializing;
        }

        match self.prepare() {
            Ok(plugin_hooks) => {
                let mut inner = self.inner();
                // Plugin hooks run after any registered before initialisation.
                let mut hooks = std::mem::take(&mut inner.hooks);
                hooks.extend(plugin_hooks);
                inner.hooks = hooks;
                inner.status = NodeActorStatus::Ready;
                inner.last_error = None;
                debug!(actor_id = %self.id, node_name = %self.node.name(), "Node actor ready");
                Ok(())
            }
            Err(e) => {
                error!(actor_id = %self.id, node_name = %self.node.name(), error = %e, "Node actor initialization failed");
                self.inner().last_error = Some(self.actor_error(&e, None));
                Err(e)
            }
        }
    }

    /// Return an actor left `Executing` by a failed or interrupted run to
    /// `Ready`.
    pub fn recover(&self) -> Result<()> {
        let mut inner = self.inner();
        if inner.status != NodeActorStatus::Executing {
            return Err(self.conflict("recover", inner.status));
        }
        inner.status = NodeActorStatus::Ready;
        inner.last_error = None;
        info!(actor_id = %self.id, "Node actor recovered");
        Ok(())
    }

    /// Stop accepting work and wait for any in-flight execution.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _guard = self.exec_lock.lock().await;
        self.inner().status = NodeActorStatus::Shutdown;
        info!(actor_id = %self.id, node_name = %self.node.name(), "Node actor shut down");
    }

    /// Run the node once.
    ///
    /// Failures are returned as [`StrandError::Actor`] and leave the actor
    /// `Executing` until [`NodeActor::recover`] is called.
    pub async fn execute(
        &self,
        input: Payload,
        execution_id: Uuid,
        context: Map<String, Value>,
    ) -> Result<ActorResult> {
        if self.shutdown.is_cancelled() {
            return Err(self.conflict("execute", NodeActorStatus::Shutdown));
        }

        let _guard = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                return Err(self.conflict("execute", NodeActorStatus::Shutdown));
            }
            guard = self.exec_lock.lock() => guard,
        };

        let (mut state, hooks) = {
            let mut inner = self.inner();
            if !inner.status.can_execute() {
                return Err(self.conflict("execute", inner.status));
            }
            inner.status = NodeActorStatus::Executing;
            (inner.state.clone(), inner.hooks.clone())
        };

        debug!(actor_id = %self.id, execution_id = %execution_id, node_name = %self.node.name(), "Executing node");
        let result = self
            .run(input, execution_id, context, &mut state, &hooks)
            .await;

        let mut inner = self.inner();
        inner.state = state;
        match result {
            Ok(result) => {
                inner.status = NodeActorStatus::Completed;
                inner.last_error = None;
                debug!(
                    actor_id = %self.id,
                    execution_id = %execution_id,
                    next_nodes = result.next_nodes.len(),
                    "Node execution complete"
                );
                Ok(result)
            }
            Err(e) => {
                let err = self.actor_error(&e, Some(execution_id));
                error!(
                    actor_id = %self.id,
                    execution_id = %execution_id,
                    node_name = %self.node.name(),
                    error = %e,
                    "Node execution failed"
                );
                inner.last_error = Some(err.clone());
                Err(err.into())
            }
        }
    }

    async fn run(
        &self,
        input: Payload,
        execution_id: Uuid,
        context: Map<String, Value>,
        state: &mut NodeState,
        hooks: &HookSet,
    ) -> Result<ActorResult> {
        let info = self.info();
        // Post hooks see the caller's input, not the pre-hook rewrite.
        let original_input = input.clone();
        let pre = hooks
            .run_pre(
                &info,
                PreHookData {
                    input,
                    execution_id,
                    context,
                },
            )
            .await?;

        let ctx = ExecutionContext {
            actor_id: self.id,
            execution_id,
            node_name: info.node_name.clone(),
            node_kind: info.node_kind,
            values: pre.context.clone(),
        };

        state.input = Some(pre.input.clone());
        let output = self.dispatch(pre.input.clone(), state, &ctx).await?;
        state.output = Some(output.clone());

        let next_nodes = self.next_nodes(&output, state)?;

        let post = hooks
            .run_post(
                &info,
                PostHookData {
                    input: original_input,
                    execution_id,
                    context: pre.context,
                    output,
                    next_nodes,
                },
            )
            .await?;

        Ok(ActorResult {
            output: post.output,
            next_nodes: post.next_nodes,
        })
    }

    async fn dispatch(
        &self,
        input: Payload,
        state: &mut NodeState,
        ctx: &ExecutionContext,
    ) -> Result<Payload> {
        match &self.node {
            NodeRef::Llm(node) => {
                let model = self.model.as_ref().ok_or_else(|| {
                    StrandError::MissingDependency(format!(
                        "Model-backed node '{}' has no chat model bound",
                        node.name()
                    ))
                })?;
                state.messages.extend(input.into_messages());
                let output = node.invoke(model.as_ref(), state, ctx).await?;
                if let Payload::Message(reply) = &output {
                    state.messages.push(reply.clone());
                }
                Ok(output)
            }
            NodeRef::Tool(node) => {
                let call = tool_call_from(input, node.name())?;
                node.invoke(call, state, ctx).await
            }
            NodeRef::Function(node) => node.invoke(input, state, ctx).await,
        }
    }

    fn next_nodes(&self, output: &Payload, state: &NodeState) -> Result<Vec<NextNode>> {
        if self.node.is_model_backed() {
            return routing::route_tool_calls(&self.registry, output);
        }
        routing::route_edges(
            &self.registry,
            &self.conditions,
            self.node.edges(),
            output,
            NodeActorStatus::Executing,
            state,
        )
    }
}

fn tool_call_from(input: Payload, tool: &str) -> Result<ToolCall> {
    match input {
        Payload::ToolCall(call) => Ok(call),
        Payload::Json(value) => serde_json::from_value(value).map_err(|e| {
            StrandError::InvalidInput {
                node: tool.to_string(),
                message: format!("not a tool call: {}", e),
            }
        }),
        other => {
            warn!(tool, "Tool node received a non tool-call payload");
            Err(StrandError::InvalidInput {
                node: tool.to_string(),
                message: format!("expected a tool call, got {}", payload_kind(&other)),
            })
        }
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Text(_) => "text",
        Payload::Message(_) => "message",
        Payload::ToolCall(_) => "tool call",
        Payload::Json(_) => "json",
        Payload::Batch(_) => "batch",
    }
}
