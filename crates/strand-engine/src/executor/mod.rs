//! Tree-structured executor.
//!
//! An [`Executor`] drives one branch of a run: it feeds input to its current
//! actor and follows the successors. A single successor continues in place;
//! two or more fork a child executor each, run them concurrently and feed
//! the joined outputs back into the same actor. The root executor owns
//! persistence for the whole tree.

mod context;
mod state;

pub use context::ExecutorContext;
pub use state::{
    BranchFailure, ExecutorInput, ExecutorOutput, ExecutorState, ExecutorStatus, JoinReport,
    Snapshot,
};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{join_all, BoxFuture};
use serde_json::Map;
use tracing::{debug, info, warn};
use uuid::Uuid;

use strand_core::error::{Result, StrandError};
use strand_core::event::EngineEvent;
use strand_core::traits::{NextNode, NodeRef};
use strand_core::types::Payload;

use crate::actor::{ActorResult, ActorSnapshot, NodeActor};
use crate::status::NodeActorStatus;

struct ExecState {
    status: ExecutorStatus,
    node_actor_id: Uuid,
    iteration_count: usize,
    child_ids: BTreeSet<Uuid>,
    pending_input: Option<Payload>,
    actors: Vec<Arc<NodeActor>>,
    children: HashMap<Uuid, Executor>,
    completed_responses: Vec<String>,
    last_join: Option<JoinReport>,
}

struct ExecutorInner {
    execution_id: Uuid,
    ctx: ExecutorContext,
    parent: Option<Weak<ExecutorInner>>,
    root: Option<Weak<ExecutorInner>>,
    state: Mutex<ExecState>,
}

/// One position in an executor tree. Cloning yields another handle to the
/// same executor.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Executor")
            .field("execution_id", &self.inner.execution_id)
            .field("status", &state.status)
            .field("node_actor_id", &state.node_actor_id)
            .field("children", &state.child_ids)
            .finish()
    }
}

impl Executor {
    fn build(
        execution_id: Uuid,
        ctx: ExecutorContext,
        parent: Option<&Executor>,
        node_actor_id: Uuid,
    ) -> Self {
        let (parent, root) = match parent {
            Some(p) => (Some(Arc::downgrade(&p.inner)), Some(p.root_weak())),
            None => (None, None),
        };
        Self {
            inner: Arc::new(ExecutorInner {
                execution_id,
                ctx,
                parent,
                root,
                state: Mutex::new(ExecState {
                    status: ExecutorStatus::Running,
                    node_actor_id,
                    iteration_count: 0,
                    child_ids: BTreeSet::new(),
                    pending_input: None,
                    actors: Vec::new(),
                    children: HashMap::new(),
                    completed_responses: Vec::new(),
                    last_join: None,
                }),
            }),
        }
    }

    /// Create a root executor whose first actor wraps `node`.
    pub fn start(ctx: ExecutorContext, node: NodeRef) -> Result<Self> {
        let actor = Arc::new(NodeActor::new(
            node,
            ctx.registry.clone(),
            ctx.model.clone(),
        ));
        actor.initialize()?;
        let executor = Self::build(Uuid::new_v4(), ctx, None, actor.id());
        executor.register_actor(actor.clone());
        info!(
            execution_id = %executor.execution_id(),
            node_name = %actor.node().name(),
            "Executor started"
        );
        Ok(executor)
    }

    fn lock(&self) -> MutexGuard<'_, ExecState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<T>(&self, f: impl FnOnce(&mut ExecState) -> T) -> T {
        f(&mut self.lock())
    }

    fn root_weak(&self) -> Weak<ExecutorInner> {
        match &self.inner.root {
            Some(root) => root.clone(),
            None => Arc::downgrade(&self.inner),
        }
    }

    fn publish(&self, event: EngineEvent) {
        self.inner.ctx.events.publish(event);
    }

    pub fn execution_id(&self) -> Uuid {
        self.inner.execution_id
    }

    pub fn context(&self) -> &ExecutorContext {
        &self.inner.ctx
    }

    pub fn status(&self) -> ExecutorStatus {
        self.lock().status
    }

    pub fn is_child(&self) -> bool {
        self.inner.parent.is_some()
    }

    pub fn iteration_count(&self) -> usize {
        self.lock().iteration_count
    }

    pub fn node_actor_id(&self) -> Uuid {
        self.lock().node_actor_id
    }

    pub fn pending_input(&self) -> Option<Payload> {
        self.lock().pending_input.clone()
    }

    pub fn child_ids(&self) -> BTreeSet<Uuid> {
        self.lock().child_ids.clone()
    }

    /// Live children, ordered by execution id.
    pub fn children(&self) -> Vec<Executor> {
        let state = self.lock();
        state
            .child_ids
            .iter()
            .filter_map(|id| state.children.get(id).cloned())
            .collect()
    }

    pub fn child(&self, execution_id: Uuid) -> Option<Executor> {
        self.lock().children.get(&execution_id).cloned()
    }

    pub fn parent(&self) -> Option<Executor> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Executor { inner })
    }

    /// The root of this tree; `self` for a root executor.
    pub fn root(&self) -> Option<Executor> {
        self.root_weak().upgrade().map(|inner| Executor { inner })
    }

    pub fn actor(&self, actor_id: Uuid) -> Option<Arc<NodeActor>> {
        self.lock().actors.iter().find(|a| a.id() == actor_id).cloned()
    }

    pub fn actors(&self) -> Vec<Arc<NodeActor>> {
        self.lock().actors.clone()
    }

    pub fn current_actor(&self) -> Option<Arc<NodeActor>> {
        let id = self.node_actor_id();
        self.actor(id)
    }

    /// Outcome of the most recent parallel join driven by this executor.
    pub fn last_join_report(&self) -> Option<JoinReport> {
        self.lock().last_join.clone()
    }

    /// The serialized form of this executor alone.
    pub fn state(&self) -> ExecutorState {
        Self::dump(self.execution_id(), self.is_child(), &self.lock())
    }

    fn dump(execution_id: Uuid, is_child: bool, state: &ExecState) -> ExecutorState {
        ExecutorState {
            execution_id,
            node_actor_id: state.node_actor_id,
            status: state.status,
            child_executor_ids: state.child_ids.clone(),
            iteration_count: state.iteration_count,
            is_child,
            actor_ids: state.actors.iter().map(|a| a.id()).collect(),
            pending_input: state.pending_input.clone(),
        }
    }

    fn register_actor(&self, actor: Arc<NodeActor>) {
        let mut state = self.lock();
        if !state.actors.iter().any(|a| a.id() == actor.id()) {
            state.actors.push(actor);
        }
    }

    fn link_child(&self, child: Executor) {
        let mut state = self.lock();
        state.child_ids.insert(child.execution_id());
        state.children.insert(child.execution_id(), child);
    }

    fn new_actor(&self, node: NodeRef) -> NodeActor {
        let ctx = &self.inner.ctx;
        NodeActor::new(node, ctx.registry.clone(), ctx.model.clone())
    }

    /// The actor this executor already drives for `node`, or a fresh
    /// initialized one.
    fn actor_for(&self, node: &NodeRef) -> Result<Arc<NodeActor>> {
        let existing = self
            .lock()
            .actors
            .iter()
            .find(|a| a.node().same_node(node))
            .cloned();
        if let Some(actor) = existing {
            return Ok(actor);
        }

        let actor = Arc::new(self.new_actor(node.clone()));
        actor.initialize()?;
        self.register_actor(actor.clone());
        Ok(actor)
    }

    fn resolve_target(&self, execution_id: Uuid) -> Result<Executor> {
        if execution_id == self.execution_id() {
            return Ok(self.clone());
        }
        self.child(execution_id).ok_or_else(|| {
            StrandError::StateConflict(format!(
                "Execution {} is neither executor {} nor one of its children",
                execution_id,
                self.execution_id()
            ))
        })
    }

    /// Run with the configured iteration cap, starting at the current actor.
    pub async fn run(&self, payload: impl Into<Payload>) -> Result<ExecutorOutput> {
        let input = ExecutorInput {
            execution_id: self.execution_id(),
            node_actor_id: self.node_actor_id(),
            payload: payload.into(),
        };
        self.step(input, self.inner.ctx.config.max_iterations).await
    }

    /// Drive `input` until the branch exits.
    ///
    /// `input.execution_id` selects this executor or one of its children.
    /// Taking more than `max_iterations` steps fails with
    /// [`StrandError::MaxIterationsExceeded`].
    pub fn step(
        &self,
        input: ExecutorInput,
        max_iterations: usize,
    ) -> BoxFuture<'static, Result<ExecutorOutput>> {
        let this = self.clone();
        Box::pin(async move {
            let target = this.resolve_target(input.execution_id)?;
            target.drive(input, max_iterations).await
        })
    }

    async fn drive(&self, input: ExecutorInput, max_iterations: usize) -> Result<ExecutorOutput> {
        match self.drive_loop(input, max_iterations).await {
            Ok(output) => {
                self.update(|s| {
                    s.status = ExecutorStatus::Completed;
                    s.pending_input = None;
                });
                self.save_root().await?;
                self.publish(EngineEvent::ExecutorCompleted {
                    execution_id: self.execution_id(),
                });
                debug!(execution_id = %self.execution_id(), "Executor completed");
                Ok(output)
            }
            Err(e) => {
                self.update(|s| s.status = ExecutorStatus::Failed);
                if let Err(save_err) = self.save_root().await {
                    warn!(
                        execution_id = %self.execution_id(),
                        error = %save_err,
                        "Failed to persist failed executor"
                    );
                }
                warn!(execution_id = %self.execution_id(), error = %e, "Executor failed");
                self.publish(EngineEvent::ExecutorFailed {
                    execution_id: self.execution_id(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive_loop(
        &self,
        input: ExecutorInput,
        max_iterations: usize,
    ) -> Result<ExecutorOutput> {
        let execution_id = self.execution_id();
        let mut actor = self.actor(input.node_actor_id).ok_or_else(|| {
            StrandError::StateConflict(format!(
                "Executor {} has no actor {}",
                execution_id, input.node_actor_id
            ))
        })?;
        let mut payload = input.payload;
        let mut steps = 0usize;

        loop {
            if steps >= max_iterations {
                return Err(StrandError::MaxIterationsExceeded(max_iterations));
            }
            steps += 1;

            let iteration = self.update(|s| {
                s.iteration_count += 1;
                s.status = ExecutorStatus::Running;
                s.node_actor_id = actor.id();
                s.pending_input = Some(payload.clone());
                s.iteration_count
            });
            self.save_root().await?;

            self.publish(EngineEvent::StepStarted {
                execution_id,
                actor_id: actor.id(),
                node_name: actor.node().name().to_string(),
                iteration,
            });
            debug!(
                execution_id = %execution_id,
                actor_id = %actor.id(),
                node_name = %actor.node().name(),
                iteration,
                "Executor step"
            );

            let ActorResult {
                output,
                mut next_nodes,
            } = actor.execute(payload, execution_id, Map::new()).await?;
            self.save_actor(&actor).await?;

            match next_nodes.len() {
                0 => {
                    return Ok(ExecutorOutput {
                        execution_id,
                        node_actor_id: actor.id(),
                        output,
                        exit: true,
                    });
                }
                1 => {
                    let next = next_nodes.remove(0);
                    let next_actor = self.actor_for(&next.node)?;
                    self.publish(EngineEvent::Transition {
                        execution_id,
                        from_node: actor.node().name().to_string(),
                        to_node: next_actor.node().name().to_string(),
                    });
                    actor = next_actor;
                    payload = next.input;
                }
                _ => {
                    let report = self.fan_out(next_nodes, max_iterations).await?;
                    payload = Payload::Batch(report.outputs);
                }
            }
        }
    }

    /// Fork one child per successor, run them concurrently and join.
    async fn fan_out(
        &self,
        next_nodes: Vec<NextNode>,
        max_iterations: usize,
    ) -> Result<JoinReport> {
        let execution_id = self.execution_id();
        let forks = self.fork(next_nodes)?;
        let children: Vec<Uuid> = forks.iter().map(|(c, _)| c.execution_id()).collect();

        self.update(|s| {
            s.status = ExecutorStatus::Suspended;
            s.pending_input = None;
        });
        self.save_root().await?;
        self.publish(EngineEvent::Forked {
            execution_id,
            children: children.clone(),
        });
        info!(execution_id = %execution_id, branches = children.len(), "Forked parallel branches");

        let report = self.join(forks, max_iterations).await;
        info!(
            execution_id = %execution_id,
            outputs = report.outputs.len(),
            failures = report.failures.len(),
            "Joined parallel branches"
        );

        if self.inner.ctx.config.fail_on_branch_error && report.is_partial() {
            let message = report
                .failures
                .iter()
                .map(|f| f.error.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let err = StrandError::BranchFailed {
                failed: report.failures.len(),
                total: report.total(),
                message,
            };
            self.update(|s| s.last_join = Some(report));
            return Err(err);
        }

        self.update(|s| {
            s.status = ExecutorStatus::Running;
            s.last_join = Some(report.clone());
        });
        self.save_root().await?;
        self.publish(EngineEvent::Joined {
            execution_id,
            outputs: report.outputs.len(),
            failures: report.failures.len(),
        });
        Ok(report)
    }

    /// Create one initialized actor and child executor per successor.
    ///
    /// Each child is registered under this executor and starts with the
    /// successor's input pending.
    pub fn fork(&self, next_nodes: Vec<NextNode>) -> Result<Vec<(Executor, ExecutorInput)>> {
        let mut forks = Vec::with_capacity(next_nodes.len());
        for next in next_nodes {
            let actor = Arc::new(self.new_actor(next.node));
            actor.initialize()?;

            let child = Executor::build(
                Uuid::new_v4(),
                self.inner.ctx.clone(),
                Some(self),
                actor.id(),
            );
            child.register_actor(actor.clone());
            child.update(|s| s.pending_input = Some(next.input.clone()));
            self.link_child(child.clone());

            debug!(
                execution_id = %self.execution_id(),
                child_id = %child.execution_id(),
                node_name = %actor.node().name(),
                "Forked child executor"
            );
            let input = ExecutorInput {
                execution_id: child.execution_id(),
                node_actor_id: actor.id(),
                payload: next.input,
            };
            forks.push((child, input));
        }
        Ok(forks)
    }

    async fn join(&self, forks: Vec<(Executor, ExecutorInput)>, max_iterations: usize) -> JoinReport {
        let branches = forks.into_iter().map(|(child, input)| async move {
            let child_id = child.execution_id();
            (child_id, child.step(input, max_iterations).await)
        });
        let results = join_all(branches).await;

        let mut report = JoinReport::default();
        for (child_id, result) in results {
            match result {
                Ok(output) => {
                    self.handle_child_completed(child_id);
                    report.outputs.push(output.output);
                }
                Err(e) => {
                    self.branch_failed(child_id, &e);
                    report.failures.push(BranchFailure {
                        execution_id: child_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn branch_failed(&self, child_id: Uuid, error: &StrandError) -> Option<String> {
        warn!(
            execution_id = %self.execution_id(),
            child_id = %child_id,
            error = %error,
            "Parallel branch failed"
        );
        self.publish(EngineEvent::BranchFailed {
            execution_id: self.execution_id(),
            child_id,
            error: error.to_string(),
        });
        self.discard_child(child_id)
    }

    /// Release a finished child and record its last response.
    ///
    /// Returns the merged responses once the last live child is released
    /// from a suspended executor, which is then running again.
    pub fn handle_child_completed(&self, child_id: Uuid) -> Option<String> {
        let response = self
            .child(child_id)
            .and_then(|child| child.current_actor())
            .and_then(|actor| actor.state().last_response());
        self.release_child(child_id, response)
    }

    /// Release a child without recording a response.
    pub fn discard_child(&self, child_id: Uuid) -> Option<String> {
        self.release_child(child_id, None)
    }

    fn release_child(&self, child_id: Uuid, response: Option<String>) -> Option<String> {
        let mut state = self.lock();
        state.children.remove(&child_id);
        state.child_ids.remove(&child_id);
        if let Some(response) = response {
            state.completed_responses.push(response);
        }

        if state.child_ids.is_empty() && state.status == ExecutorStatus::Suspended {
            state.status = ExecutorStatus::Running;
            let merged = std::mem::take(&mut state.completed_responses).join("\n\n");
            debug!(execution_id = %self.execution_id(), "All children finished, resuming");
            Some(merged)
        } else {
            None
        }
    }

    async fn save_actor(&self, actor: &NodeActor) -> Result<()> {
        let root_id = self.root_id();
        let value = serde_json::to_value(actor.serialize_state())?;
        self.inner
            .ctx
            .storage
            .save_actor_state(root_id, actor.id(), value)
            .await
    }

    fn root_id(&self) -> Uuid {
        self.root()
            .map(|r| r.execution_id())
            .unwrap_or(self.inner.execution_id)
    }

    async fn save_root(&self) -> Result<()> {
        match self.root() {
            Some(root) => root.save_state().await,
            None => {
                debug!(execution_id = %self.execution_id(), "Root executor dropped, skipping save");
                Ok(())
            }
        }
    }

    /// Walk the tree without recursion, collecting every executor's state
    /// and every actor it drives.
    fn collect(&self) -> (Snapshot, Vec<Arc<NodeActor>>) {
        let mut snapshot = Snapshot::new();
        let mut actors = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(executor) = stack.pop() {
            let state = executor.lock();
            snapshot.insert(
                executor.execution_id().to_string(),
                Self::dump(executor.execution_id(), executor.is_child(), &state),
            );
            actors.extend(state.actors.iter().cloned());
            stack.extend(state.children.values().cloned());
        }
        (snapshot, actors)
    }

    /// The serialized tree rooted at this executor.
    pub fn snapshot(&self) -> Snapshot {
        self.collect().0
    }

    /// Persist the whole tree under the root's execution id.
    ///
    /// Only the root saves; on a child this is a no-op.
    pub async fn save_state(&self) -> Result<()> {
        if self.is_child() {
            return Ok(());
        }

        let execution_id = self.execution_id();
        let storage = &self.inner.ctx.storage;
        let (snapshot, actors) = self.collect();
        for actor in &actors {
            let value = serde_json::to_value(actor.serialize_state())?;
            storage
                .save_actor_state(execution_id, actor.id(), value)
                .await?;
        }
        let executors = snapshot.len();
        storage
            .save_executor_state(execution_id, serde_json::to_value(&snapshot)?)
            .await?;

        debug!(execution_id = %execution_id, executors, actors = actors.len(), "Saved executor tree");
        self.publish(EngineEvent::StateSaved {
            execution_id,
            executors,
        });
        Ok(())
    }

    /// Remove every persisted record of this run.
    pub async fn delete_state(&self) -> Result<()> {
        let root_id = self.root_id();
        self.inner
            .ctx
            .storage
            .delete_execution_state(root_id)
            .await?;
        info!(execution_id = %root_id, "Deleted executor state");
        Ok(())
    }

    /// Load the saved tree of `execution_id` and rebuild it.
    pub async fn load(ctx: ExecutorContext, execution_id: Uuid) -> Result<Self> {
        let value = ctx
            .storage
            .load_executor_state(execution_id)
            .await?
            .ok_or_else(|| {
                StrandError::Restore(format!("No saved state for execution {}", execution_id))
            })?;
        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| StrandError::Restore(format!("Malformed snapshot: {}", e)))?;
        Self::restore(ctx, execution_id, &snapshot).await
    }

    /// Rebuild an executor tree from `snapshot`, top-down from `root_id`.
    ///
    /// Actor states are read from storage. A child id absent from the
    /// snapshot or referenced twice is a restore error.
    pub async fn restore(
        ctx: ExecutorContext,
        root_id: Uuid,
        snapshot: &Snapshot,
    ) -> Result<Self> {
        let mut restored = HashSet::new();
        let mut stack: Vec<(Uuid, Option<Executor>)> = vec![(root_id, None)];
        let mut root = None;

        while let Some((execution_id, parent)) = stack.pop() {
            if !restored.insert(execution_id) {
                return Err(StrandError::Restore(format!(
                    "Executor {} is referenced more than once",
                    execution_id
                )));
            }
            let saved = snapshot.get(&execution_id.to_string()).ok_or_else(|| {
                StrandError::Restore(format!("Executor {} missing from snapshot", execution_id))
            })?;

            let executor = Executor::build(
                execution_id,
                ctx.clone(),
                parent.as_ref(),
                saved.node_actor_id,
            );
            let actor_ids = if saved.actor_ids.is_empty() {
                vec![saved.node_actor_id]
            } else {
                saved.actor_ids.clone()
            };
            for actor_id in actor_ids {
                let actor = Self::restore_actor(&ctx, root_id, actor_id).await?;
                executor.register_actor(Arc::new(actor));
            }
            if executor.actor(saved.node_actor_id).is_none() {
                return Err(StrandError::Restore(format!(
                    "Executor {} does not drive its current actor {}",
                    execution_id, saved.node_actor_id
                )));
            }

            executor.update(|s| {
                s.status = saved.status;
                s.iteration_count = saved.iteration_count;
                s.pending_input = saved.pending_input.clone();
            });
            for child_id in &saved.child_executor_ids {
                stack.push((*child_id, Some(executor.clone())));
            }
            debug!(execution_id = %execution_id, status = %saved.status, "Restored executor");

            match parent {
                Some(parent) => parent.link_child(executor),
                None => root = Some(executor),
            }
        }

        let root = root.ok_or_else(|| {
            StrandError::Restore(format!("Executor {} missing from snapshot", root_id))
        })?;
        root.publish(EngineEvent::Restored {
            execution_id: root_id,
            executors: restored.len(),
        });
        info!(execution_id = %root_id, executors = restored.len(), "Executor tree restored");
        Ok(root)
    }

    async fn restore_actor(
        ctx: &ExecutorContext,
        root_id: Uuid,
        actor_id: Uuid,
    ) -> Result<NodeActor> {
        let value = ctx
            .storage
            .load_actor_state(root_id, actor_id)
            .await?
            .ok_or_else(|| {
                StrandError::Restore(format!("No saved state for actor {}", actor_id))
            })?;
        let saved: ActorSnapshot = serde_json::from_value(value)
            .map_err(|e| StrandError::Restore(format!("Malformed actor {}: {}", actor_id, e)))?;
        let node = ctx.registry.lookup(saved.node_kind, &saved.node_name)?;

        let actor =
            NodeActor::create_or_restore(node, ctx.registry.clone(), ctx.model.clone(), Some(saved))?;
        match actor.status() {
            NodeActorStatus::Idle => actor.initialize()?,
            NodeActorStatus::Executing => actor.recover()?,
            _ => {}
        }
        Ok(actor)
    }

    /// Continue an interrupted run.
    ///
    /// A suspended executor first resumes its children and then consumes
    /// the blank-line-joined merge of their last responses. A running or
    /// failed executor retries its pending input. Completed executors
    /// return `None`.
    pub fn resume(&self, max_iterations: usize) -> BoxFuture<'static, Result<Option<ExecutorOutput>>> {
        let this = self.clone();
        Box::pin(async move {
            let execution_id = this.execution_id();
            let payload = match this.status() {
                ExecutorStatus::Completed => return Ok(None),
                ExecutorStatus::Suspended => {
                    let children = this.children();
                    info!(execution_id = %execution_id, children = children.len(), "Resuming suspended executor");
                    let branches = children.into_iter().map(|child| async move {
                        let child_id = child.execution_id();
                        (child_id, child.resume(max_iterations).await)
                    });

                    let mut merged = None;
                    for (child_id, result) in join_all(branches).await {
                        let released = match result {
                            Ok(_) => this.handle_child_completed(child_id),
                            Err(e) => this.branch_failed(child_id, &e),
                        };
                        if released.is_some() {
                            merged = released;
                        }
                    }
                    // No live children were left to release.
                    let merged = match merged {
                        Some(merged) => merged,
                        None => this.update(|s| {
                            s.status = ExecutorStatus::Running;
                            s.child_ids.clear();
                            s.children.clear();
                            std::mem::take(&mut s.completed_responses).join("\n\n")
                        }),
                    };
                    Payload::text(merged)
                }
                ExecutorStatus::Running | ExecutorStatus::Failed => {
                    let pending = this.pending_input().ok_or_else(|| {
                        StrandError::Restore(format!(
                            "Executor {} has no pending input to resume",
                            execution_id
                        ))
                    })?;
                    if let Some(actor) = this.current_actor() {
                        if actor.status() == NodeActorStatus::Executing {
                            actor.recover()?;
                        }
                    }
                    info!(execution_id = %execution_id, "Resuming executor from pending input");
                    pending
                }
            };

            let input = ExecutorInput {
                execution_id,
                node_actor_id: this.node_actor_id(),
                payload,
            };
            this.step(input, max_iterations).await.map(Some)
        })
    }
}
