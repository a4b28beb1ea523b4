use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use strand_core::error::{Result, StrandError};
use strand_core::traits::StateStorage;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS executor_states (
        execution_id TEXT PRIMARY KEY,
        state_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS actor_states (
        execution_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        state_json TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (execution_id, actor_id)
    );";

fn db_err(e: rusqlite::Error) -> StrandError {
    StrandError::Storage(e.to_string())
}

/// SQLite-backed state storage. Writes are upserts, so the latest save
/// of a key always wins.
pub struct SqliteStateStorage {
    conn: Mutex<Connection>,
}

impl SqliteStateStorage {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StrandError::Storage(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite state storage opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn decode(json: Option<String>) -> Result<Option<Value>> {
    json.map(|s| serde_json::from_str(&s).map_err(StrandError::from))
        .transpose()
}

impl StateStorage for SqliteStateStorage {
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
        let json = serde_json::to_string(&state)?;
        self.conn()
            .execute(
                "INSERT INTO executor_states (execution_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id) DO UPDATE SET
                    state_json = excluded.state_json,
                    updated_at = excluded.updated_at",
                params![execution_id.to_string(), json, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn blocking_load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT state_json FROM executor_states WHERE execution_id = ?1",
                params![execution_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        decode(json)
    }

    fn blocking_save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> Result<()> {
        let json = serde_json::to_string(&state)?;
        self.conn()
            .execute(
                "INSERT INTO actor_states (execution_id, actor_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(execution_id, actor_id) DO UPDATE SET
                    state_json = excluded.state_json,
                    updated_at = excluded.updated_at",
                params![
                    execution_id.to_string(),
                    actor_id.to_string(),
                    json,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn blocking_load_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<Value>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT state_json FROM actor_states WHERE execution_id = ?1 AND actor_id = ?2",
                params![execution_id.to_string(), actor_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        decode(json)
    }

    fn blocking_delete_execution_state(&self, execution_id: Uuid) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err)?;
        let id = execution_id.to_string();
        tx.execute(
            "DELETE FROM executor_states WHERE execution_id = ?1",
            params![id],
        )
        .map_err(db_err)?;
        let actors = tx
            .execute("DELETE FROM actor_states WHERE execution_id = ?1", params![id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(execution_id = %execution_id, actors, "Deleted execution state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cross_form_consistency() {
        let storage = SqliteStateStorage::in_memory().unwrap();
        let exec = Uuid::new_v4();
        let actor = Uuid::new_v4();

        storage
            .save_executor_state(exec, json!({"status": "running"}))
            .await
            .unwrap();
        assert_eq!(
            storage.blocking_load_executor_state(exec).unwrap(),
            Some(json!({"status": "running"}))
        );

        storage
            .blocking_save_actor_state(exec, actor, json!({"messages": []}))
            .unwrap();
        assert_eq!(
            storage.load_actor_state(exec, actor).await.unwrap(),
            Some(json!({"messages": []}))
        );

        storage.blocking_delete_execution_state(exec).unwrap();
        assert_eq!(storage.load_executor_state(exec).await.unwrap(), None);
        assert_eq!(storage.load_actor_state(exec, actor).await.unwrap(), None);
    }

    #[test]
    fn test_upsert_overwrites() {
        let storage = SqliteStateStorage::in_memory().unwrap();
        let exec = Uuid::new_v4();
        storage.blocking_save_executor_state(exec, json!(1)).unwrap();
        storage.blocking_save_executor_state(exec, json!(2)).unwrap();
        assert_eq!(
            storage.blocking_load_executor_state(exec).unwrap(),
            Some(json!(2))
        );
    }

    #[test]
    fn test_missing_key_is_none() {
        let storage = SqliteStateStorage::in_memory().unwrap();
        assert_eq!(
            storage
                .blocking_load_actor_state(Uuid::new_v4(), Uuid::new_v4())
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let exec = Uuid::new_v4();
        {
            let storage = SqliteStateStorage::open(&path).unwrap();
            storage.save_executor_state(exec, json!({"k": "v"})).await.unwrap();
        }
        let storage = SqliteStateStorage::open(&path).unwrap();
        assert_eq!(
            storage.load_executor_state(exec).await.unwrap(),
            Some(json!({"k": "v"}))
        );
    }
}
