//! Store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the message store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file. `:memory:` opens an in-memory
    /// store.
    pub path: PathBuf,

    /// Number of metadata/content table groups. Fixed for the lifetime of
    /// a database: changing it after rows exist misroutes them.
    #[serde(default = "default_table_groups")]
    pub table_groups: usize,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait on a locked database before failing a statement.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Aggregate key weight, in bytes of queue name, the routing cache may
    /// hold before evicting least-recently-used mappings.
    #[serde(default = "default_queue_cache_weight")]
    pub queue_cache_weight: usize,

    /// Total bytes of message metadata and payload the read cache may
    /// hold. Zero disables the read cache.
    #[serde(default = "default_message_cache_weight")]
    pub message_cache_weight: usize,
}

fn default_table_groups() -> usize {
    4
}

fn default_max_connections() -> u32 {
    1
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_queue_cache_weight() -> usize {
    2 * 1024 * 1024
}

fn default_message_cache_weight() -> usize {
    256 * 1024 * 1024
}

impl StoreConfig {
    /// Config pointing at a database file, defaults for everything else.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Config for an in-memory store, handy in tests.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("path must not be empty".to_string());
        }
        if self.table_groups == 0 {
            return Err("table_groups must be at least 1".to_string());
        }
        if self.table_groups > 1024 {
            return Err(format!(
                "table_groups is {} but must be at most 1024",
                self.table_groups
            ));
        }
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("silo.db"),
            table_groups: default_table_groups(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            queue_cache_weight: default_queue_cache_weight(),
            message_cache_weight: default_message_cache_weight(),
        }
    }
}
