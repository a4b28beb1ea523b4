pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use strand_core::config::{StorageBackend, StorageConfig};
use strand_core::error::{Result, StrandError};
use strand_core::traits::StateStorage;

pub use memory::InMemoryStateStorage;
pub use sqlite::SqliteStateStorage;

/// Open the storage backend selected by configuration.
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn StateStorage>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryStateStorage::new())),
        StorageBackend::Sqlite => {
            let path = config.resolved_path().ok_or_else(|| {
                StrandError::Config("storage.path is required for the sqlite backend".into())
            })?;
            Ok(Arc::new(SqliteStateStorage::open(&path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_open_memory() {
        let storage = open_storage(&StorageConfig::default()).unwrap();
        let id = Uuid::new_v4();
        storage.save_executor_state(id, json!({"a": 1})).await.unwrap();
        assert_eq!(
            storage.load_executor_state(id).await.unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_open_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: Some(dir.path().join("nested/state.db").display().to_string()),
        };
        let storage = open_storage(&config).unwrap();
        let id = Uuid::new_v4();
        storage.blocking_save_executor_state(id, json!([1])).unwrap();
        assert!(dir.path().join("nested/state.db").exists());
    }

    #[test]
    fn test_sqlite_without_path() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: None,
        };
        assert!(open_storage(&config).is_err());
    }
}
