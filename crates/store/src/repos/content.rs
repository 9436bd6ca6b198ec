//! Message content repository.

use std::collections::HashMap;

use async_trait::async_trait;
use silo_core::ContentChunk;

use crate::error::StoreResult;

/// Repository for message payload chunks.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Persist payload chunks for messages whose metadata already exists.
    ///
    /// Chunks land in the same shard as their message's metadata row.
    /// Writing a chunk for a message with no metadata row is an integrity
    /// violation.
    async fn store_chunks(&self, chunks: &[ContentChunk]) -> StoreResult<()>;

    /// Get one chunk by message id and byte offset.
    async fn get_chunk(&self, message_id: u64, offset: i32) -> StoreResult<Option<ContentChunk>>;

    /// Get all chunks for many messages in a few queries instead of one per
    /// message. Keys of the input map are queue names, used to find each id
    /// list's shard. Messages with no content are absent from the result.
    async fn get_chunks_batch(
        &self,
        ids_by_queue: &HashMap<String, Vec<u64>>,
    ) -> StoreResult<HashMap<u64, Vec<ContentChunk>>>;
}
