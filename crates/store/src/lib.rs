//! Sharded SQLite persistence layer for the silo message broker.
//!
//! This crate provides the broker's durable data model:
//! - Message metadata and payload chunks, sharded over table groups
//! - Queue name to id mappings with derived shard routing
//! - Dead letter channel placement and browsing
//! - Retained messages per destination
//! - Expiration tracking for timed messages

pub mod cache;
pub mod error;
pub mod models;
pub mod repos;
pub mod router;
pub mod store;

mod statements;

pub use cache::{DisabledMessageCache, LruMessageCache, MessageCache};
pub use error::{StoreError, StoreResult};
pub use router::QueueRouter;
pub use store::{MessageStore, SqliteMessageStore};

use silo_core::StoreConfig;
use std::sync::Arc;

/// Create a message store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn MessageStore>> {
    let store = SqliteMessageStore::new(config).await?;
    tracing::info!(
        path = %config.path.display(),
        table_groups = config.table_groups,
        "message store initialized"
    );
    Ok(Arc::new(store) as Arc<dyn MessageStore>)
}
