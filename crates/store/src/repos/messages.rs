//! Message metadata repository.

use std::collections::HashMap;

use async_trait::async_trait;
use silo_core::{Message, MessageMetadata};

use crate::error::StoreResult;

/// Repository for message metadata operations.
///
/// Message ids are globally unique and monotonically increasing, so every
/// range or paging read orders by id. Messages parked in a dead letter
/// channel keep their original queue id and are excluded from normal queue
/// reads by the DLC marker column.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Persist a batch of messages (metadata, content, and expiry rows) in
    /// one transaction.
    ///
    /// If any row is rejected by an integrity constraint, most commonly
    /// because a destination queue disappeared, the whole transaction rolls
    /// back and the batch is retried one message at a time; only the
    /// rejected messages are dropped.
    async fn store_messages(&self, messages: &[Message]) -> StoreResult<()>;

    /// Persist a single message. A message the database rejects with an
    /// integrity constraint, typically because its destination queue no
    /// longer exists or its id is already stored, is dropped with a warning
    /// rather than failing the caller.
    async fn store_message(&self, message: &Message) -> StoreResult<()>;

    /// Get one message's metadata by id, from cache or any shard.
    async fn get_metadata(&self, message_id: u64) -> StoreResult<Option<MessageMetadata>>;

    /// Get metadata for all queue messages with ids in `[first, last]`,
    /// ordered by id. Messages moved to a dead letter channel are excluded.
    async fn get_metadata_range(
        &self,
        queue: &str,
        first_message_id: u64,
        last_message_id: u64,
    ) -> StoreResult<Vec<MessageMetadata>>;

    /// Page through a queue: up to `limit` metadata entries with ids at or
    /// after `first_message_id`, ordered by id.
    async fn get_next_metadata_from_queue(
        &self,
        queue: &str,
        first_message_id: u64,
        limit: u32,
    ) -> StoreResult<Vec<MessageMetadata>>;

    /// Page through a queue returning only message ids.
    async fn get_next_message_ids_from_queue(
        &self,
        queue: &str,
        first_message_id: u64,
        limit: u32,
    ) -> StoreResult<Vec<u64>>;

    /// Page through everything parked in a dead letter channel, across all
    /// origin queues.
    async fn get_metadata_in_dlc(
        &self,
        dlc_queue: &str,
        first_message_id: u64,
        limit: u32,
    ) -> StoreResult<Vec<MessageMetadata>>;

    /// Page through the messages a single origin queue has parked in a dead
    /// letter channel.
    async fn get_metadata_in_dlc_for_queue(
        &self,
        queue: &str,
        dlc_queue: &str,
        first_message_id: u64,
        limit: u32,
    ) -> StoreResult<Vec<MessageMetadata>>;

    /// Move one message from `from_queue` to `to_queue`. A message that is
    /// no longer in `from_queue` is left untouched.
    async fn move_to_queue(
        &self,
        message_id: u64,
        from_queue: &str,
        to_queue: &str,
    ) -> StoreResult<()>;

    /// Park messages in a dead letter channel without moving their rows.
    ///
    /// With `expire_in_dlc` set, expiry tracking follows the messages into
    /// the channel; otherwise their expiry rows are dropped and parked
    /// messages never expire.
    async fn move_to_dlc(
        &self,
        message_ids: &[u64],
        dlc_queue: &str,
        expire_in_dlc: bool,
    ) -> StoreResult<()>;

    /// Delete the given messages from a queue, their content rows (by
    /// cascade), and their expiry rows.
    async fn delete_messages(&self, queue: &str, message_ids: &[u64]) -> StoreResult<()>;

    /// Delete messages out of a dead letter channel, wherever their rows
    /// live.
    async fn delete_dlc_messages(&self, message_ids: &[u64]) -> StoreResult<()>;

    /// Delete every message in the queue that is not parked in a dead
    /// letter channel. Returns the number of rows removed.
    async fn clear_queue(&self, queue: &str) -> StoreResult<u64>;

    /// Delete every message parked in the dead letter channel. Returns the
    /// number of rows removed.
    async fn clear_dlc(&self, dlc_queue: &str) -> StoreResult<u64>;

    /// Count queue messages with ids in `[first, last]`.
    async fn count_in_range(
        &self,
        queue: &str,
        first_message_id: u64,
        last_message_id: u64,
    ) -> StoreResult<i64>;

    /// Count a queue's messages, excluding those parked in a dead letter
    /// channel.
    async fn count_for_queue(&self, queue: &str) -> StoreResult<i64>;

    /// Count messages for several queues in one pass over the shards.
    ///
    /// Dead letter channel names in the input are skipped. Queues with no
    /// mapping row report zero.
    async fn count_for_all_queues(&self, queues: &[String]) -> StoreResult<HashMap<String, i64>>;

    /// Count the messages a single origin queue has parked in the dead
    /// letter channel.
    async fn count_for_queue_in_dlc(&self, queue: &str, dlc_queue: &str) -> StoreResult<i64>;

    /// Count everything parked in the dead letter channel.
    async fn count_in_dlc(&self, dlc_queue: &str) -> StoreResult<i64>;
}
