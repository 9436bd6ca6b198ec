//! Row shapes decoded from the database.

use silo_core::{ContentChunk, MessageMetadata};
use sqlx::FromRow;

/// Sentinel stored in `dlc_queue_id` for messages not in any dead letter
/// channel.
pub const NOT_IN_DLC: i32 = -1;

/// A metadata row joined with its owning queue's name.
#[derive(Debug, FromRow)]
pub struct MetadataRow {
    pub message_id: u64,
    pub queue_id: i32,
    pub dlc_queue_id: i32,
    pub metadata: Vec<u8>,
    pub queue_name: Option<String>,
}

impl MetadataRow {
    pub fn into_metadata(self) -> MessageMetadata {
        MessageMetadata {
            message_id: self.message_id,
            queue: self.queue_name.unwrap_or_default(),
            metadata: self.metadata,
        }
    }
}

/// A metadata row read in the context of a known queue, so only the id and
/// the blob travel over the wire.
#[derive(Debug, FromRow)]
pub struct MetadataBlobRow {
    pub message_id: u64,
    pub metadata: Vec<u8>,
}

impl MetadataBlobRow {
    pub fn into_metadata(self, queue: &str) -> MessageMetadata {
        MessageMetadata {
            message_id: self.message_id,
            queue: queue.to_string(),
            metadata: self.metadata,
        }
    }
}

/// A single content chunk row.
#[derive(Debug, FromRow)]
pub struct ContentRow {
    pub message_id: u64,
    pub content_offset: i32,
    pub content: Vec<u8>,
}

impl ContentRow {
    pub fn into_chunk(self) -> ContentChunk {
        ContentChunk {
            message_id: self.message_id,
            offset: self.content_offset,
            data: self.content,
        }
    }
}

/// The pointer half of a retained entry: which message currently backs a
/// destination.
#[derive(Debug, FromRow)]
pub struct RetainedPointerRow {
    pub topic_id: i32,
    pub message_id: u64,
}

/// One queue's message count from an aggregated per-shard query.
#[derive(Debug, FromRow)]
pub struct QueueCountRow {
    pub queue_name: String,
    pub message_count: i64,
}
