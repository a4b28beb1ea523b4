use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use strand_core::error::Result;
use strand_core::traits::StateStorage;

#[derive(Default)]
struct Tables {
    executors: HashMap<Uuid, Value>,
    actors: HashMap<(Uuid, Uuid), Value>,
}

/// Process-local storage. State is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStateStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored actor states across all executions.
    pub fn actor_state_count(&self) -> usize {
        self.tables().actors.len()
    }
}

impl StateStorage for InMemoryStateStorage {
    fn save_executor_state(&self, execution_id: Uuid, state: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.blocking_save_executor_state(execution_id, state) })
    }

    fn load_executor_state(&self, execution_id: Uuid) -> BoxFuture<'_, Result<Option<Value>>> {
        Box::pin(async move { self.blocking_load_executor_state(execution_id) })
    }

    fn save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.blocking_save_actor_state(execution_id, actor_id, state) })
    }

    fn load_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Value>>> {
        Box::pin(async move { self.blocking_load_actor_state(execution_id, actor_id) })
    }

    fn delete_execution_state(&self, execution_id: Uuid) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.blocking_delete_execution_state(execution_id) })
    }

    fn blocking_save_executor_state(&self, execution_id: Uuid, state: Value) -> Result<()> {
        self.tables().executors.insert(execution_id, state);
        Ok(())
    }

    fn blocking_load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>> {
        Ok(self.tables().executors.get(&execution_id).cloned())
    }

    fn blocking_save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> Result<()> {
        self.tables().actors.insert((execution_id, actor_id), state);
        Ok(())
    }

    fn blocking_load_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<Value>> {
        Ok(self.tables().actors.get(&(execution_id, actor_id)).cloned())
    }

    fn blocking_delete_execution_state(&self, execution_id: Uuid) -> Result<()> {
        let mut tables = self.tables();
        tables.executors.remove(&execution_id);
        tables.actors.retain(|(exec, _), _| *exec != execution_id);
        Ok(())
    }
}
