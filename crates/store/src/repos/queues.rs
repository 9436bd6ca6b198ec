//! Queue repository.

use crate::error::StoreResult;
use async_trait::async_trait;

/// Repository for queue lifecycle operations.
#[async_trait]
pub trait QueueRepo: Send + Sync {
    /// Ensure a mapping row exists for the queue. Creating a queue that
    /// already exists is not an error; the existing mapping is kept.
    async fn add_queue(&self, queue: &str) -> StoreResult<()>;

    /// Delete the queue's mapping row and drop its cached routing entry.
    ///
    /// Fails with an integrity violation while any message row still
    /// references the queue; callers purge the queue first.
    async fn remove_queue(&self, queue: &str) -> StoreResult<()>;

    /// Drop the cached routing entry without touching the database.
    fn invalidate_queue_cache(&self, queue: &str);
}
