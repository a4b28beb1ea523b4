//! Pre- and post-execution hooks run by node actors.
//!
//! Hooks run in registration order and each sees the record returned by
//! the previous one, so a hook can rewrite the input or inject context.
//! An error from any hook aborts the execution.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::traits::NextNode;
use crate::types::{NodeKind, Payload};

/// Identity of the actor a hook runs for.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorInfo {
    pub actor_id: Uuid,
    pub composite_id: String,
    pub node_kind: NodeKind,
    pub node_name: String,
}

#[derive(Debug, Clone)]
pub struct PreHookData {
    pub input: Payload,
    pub execution_id: Uuid,
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct PostHookData {
    pub input: Payload,
    pub execution_id: Uuid,
    pub context: Map<String, Value>,
    pub output: Payload,
    pub next_nodes: Vec<NextNode>,
}

pub trait PreExecutionHook: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PreHookData,
    ) -> BoxFuture<'a, Result<PreHookData>>;
}

pub trait PostExecutionHook: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PostHookData,
    ) -> BoxFuture<'a, Result<PostHookData>>;
}

/// Adapts a synchronous closure into a [`PreExecutionHook`].
pub struct SyncPreHook<F> {
    name: String,
    f: F,
}

impl<F> SyncPreHook<F>
where
    F: Fn(&ActorInfo, PreHookData) -> Result<PreHookData> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> PreExecutionHook for SyncPreHook<F>
where
    F: Fn(&ActorInfo, PreHookData) -> Result<PreHookData> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PreHookData,
    ) -> BoxFuture<'a, Result<PreHookData>> {
        let result = (self.f)(actor, data);
        Box::pin(async move { result })
    }
}

/// Adapts a synchronous closure into a [`PostExecutionHook`].
pub struct SyncPostHook<F> {
    name: String,
    f: F,
}

impl<F> SyncPostHook<F>
where
    F: Fn(&ActorInfo, PostHookData) -> Result<PostHookData> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> PostExecutionHook for SyncPostHook<F>
where
    F: Fn(&ActorInfo, PostHookData) -> Result<PostHookData> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PostHookData,
    ) -> BoxFuture<'a, Result<PostHookData>> {
        let result = (self.f)(actor, data);
        Box::pin(async move { result })
    }
}

/// The ordered hook chains of one actor.
#[derive(Clone, Default)]
pub struct HookSet {
    pre: Vec<Arc<dyn PreExecutionHook>>,
    post: Vec<Arc<dyn PostExecutionHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre(&mut self, hook: Arc<dyn PreExecutionHook>) {
        self.pre.push(hook);
    }

    pub fn add_post(&mut self, hook: Arc<dyn PostExecutionHook>) {
        self.post.push(hook);
    }

    /// Append another set's hooks after this set's.
    pub fn extend(&mut self, other: HookSet) {
        self.pre.extend(other.pre);
        self.post.extend(other.post);
    }

    pub fn pre_len(&self) -> usize {
        self.pre.len()
    }

    pub fn post_len(&self) -> usize {
        self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    pub async fn run_pre(&self, actor: &ActorInfo, mut data: PreHookData) -> Result<PreHookData> {
        for hook in &self.pre {
            debug!(hook = hook.name(), actor_id = %actor.actor_id, "Running pre-execution hook");
            data = hook.call(actor, data).await?;
        }
        Ok(data)
    }

    pub async fn run_post(
        &self,
        actor: &ActorInfo,
        mut data: PostHookData,
    ) -> Result<PostHookData> {
        for hook in &self.post {
            debug!(hook = hook.name(), actor_id = %actor.actor_id, "Running post-execution hook");
            data = hook.call(actor, data).await?;
        }
        Ok(data)
    }
}

/// Execute hook commands with environment variables.
/// Fire-and-forget: errors are logged, not propagated.
pub async fn run_commands(commands: &[String], env_vars: &[(&str, String)]) {
    for cmd in commands {
        let mut command = tokio::process::Command::new("sh");
        command.args(["-c", cmd]);
        for (key, val) in env_vars {
            command.env(key, val);
        }
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        match command.status().await {
            Ok(s) if !s.success() => warn!(hook = %cmd, code = s.code(), "Hook exited non-zero"),
            Err(e) => warn!(hook = %cmd, error = %e, "Hook failed to execute"),
            _ => {}
        }
    }
}

fn command_env(actor: &ActorInfo, execution_id: Uuid, phase: &str) -> Vec<(&'static str, String)> {
    vec![
        ("STRAND_PHASE", phase.to_string()),
        ("STRAND_ACTOR_ID", actor.actor_id.to_string()),
        ("STRAND_NODE_KIND", actor.node_kind.to_string()),
        ("STRAND_NODE_NAME", actor.node_name.clone()),
        ("STRAND_EXECUTION_ID", execution_id.to_string()),
    ]
}

/// Runs shell commands before a node executes.
pub struct CommandPreHook {
    pub commands: Vec<String>,
}

impl PreExecutionHook for CommandPreHook {
    fn name(&self) -> &str {
        "command:on_node_start"
    }

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PreHookData,
    ) -> BoxFuture<'a, Result<PreHookData>> {
        Box::pin(async move {
            let env = command_env(actor, data.execution_id, "start");
            run_commands(&self.commands, &env).await;
            Ok(data)
        })
    }
}

/// Runs shell commands after a node executes.
pub struct CommandPostHook {
    pub commands: Vec<String>,
}

impl PostExecutionHook for CommandPostHook {
    fn name(&self) -> &str {
        "command:on_node_complete"
    }

    fn call<'a>(
        &'a self,
        actor: &'a ActorInfo,
        data: PostHookData,
    ) -> BoxFuture<'a, Result<PostHookData>> {
        Box::pin(async move {
            let mut env = command_env(actor, data.execution_id, "complete");
            env.push(("STRAND_NEXT_COUNT", data.next_nodes.len().to_string()));
            run_commands(&self.commands, &env).await;
            Ok(data)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrandError;

    fn info() -> ActorInfo {
        let actor_id = Uuid::new_v4();
        ActorInfo {
            actor_id,
            composite_id: format!("node_actor/function/f/{}", actor_id),
            node_kind: NodeKind::Function,
            node_name: "f".into(),
        }
    }

    fn pre_data() -> PreHookData {
        PreHookData {
            input: Payload::text("in"),
            execution_id: Uuid::new_v4(),
            context: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_pre_hooks_run_in_order() {
        let mut hooks = HookSet::new();
        hooks.add_pre(Arc::new(SyncPreHook::new("first", |_, mut d: PreHookData| {
            d.input = Payload::text(format!("{}-a", d.input.content()));
            Ok(d)
        })));
        hooks.add_pre(Arc::new(SyncPreHook::new("second", |_, mut d: PreHookData| {
            d.input = Payload::text(format!("{}-b", d.input.content()));
            Ok(d)
        })));

        let out = hooks.run_pre(&info(), pre_data()).await.unwrap();
        assert_eq!(out.input, Payload::text("in-a-b"));
    }

    #[tokio::test]
    async fn test_hook_error_stops_chain() {
        let mut hooks = HookSet::new();
        hooks.add_pre(Arc::new(SyncPreHook::new("deny", |_, _| {
            Err(StrandError::Hook {
                hook: "deny".into(),
                message: "not allowed".into(),
            })
        })));
        hooks.add_pre(Arc::new(SyncPreHook::new("never", |_, _: PreHookData| {
            panic!("should not run")
        })));

        let err = hooks.run_pre(&info(), pre_data()).await.unwrap_err();
        assert!(matches!(err, StrandError::Hook { .. }));
    }

    #[tokio::test]
    async fn test_command_hook_failure_is_not_fatal() {
        let hook = CommandPreHook {
            commands: vec!["exit 3".into()],
        };
        let data = hook.call(&info(), pre_data()).await.unwrap();
        assert_eq!(data.input, Payload::text("in"));
    }

    #[tokio::test]
    async fn test_command_hook_sees_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.out");
        let hook = CommandPreHook {
            commands: vec![format!("echo $STRAND_NODE_NAME > {}", path.display())],
        };
        hook.call(&info(), pre_data()).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim(), "f");
    }
}
