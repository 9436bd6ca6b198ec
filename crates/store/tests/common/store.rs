//! Message store test utilities.

use silo_core::StoreConfig;
use silo_store::{MessageStore, SqliteMessageStore, StoreResult};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

/// A test message store backed by a temporary database file.
#[allow(dead_code)]
pub struct TestStore {
    pub store: Arc<SqliteMessageStore>,
    _temp_dir: TempDir,
}

impl TestStore {
    /// Create a test store with default configuration.
    pub async fn new() -> StoreResult<Self> {
        Self::with_config(|_| {}).await
    }

    /// Create a test store with a configuration override.
    pub async fn with_config(adjust: impl FnOnce(&mut StoreConfig)) -> StoreResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("messages.db");
        let mut config = StoreConfig::new(&db_path);
        adjust(&mut config);
        let store = SqliteMessageStore::new(&config).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    /// Create a test store with a specific shard count.
    #[allow(dead_code)]
    pub async fn with_table_groups(table_groups: usize) -> StoreResult<Self> {
        Self::with_config(|config| config.table_groups = table_groups).await
    }

    /// Get the store as a trait object.
    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.store.clone()
    }

    /// Get the SQLite connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }
}
