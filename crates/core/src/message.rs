//! Message domain types.

use serde::{Deserialize, Serialize};

/// One chunk of a message payload.
///
/// Payloads are stored as an ordered sequence of chunks keyed by byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Id of the message this chunk belongs to.
    pub message_id: u64,
    /// Byte offset of the chunk within the full payload.
    pub offset: i32,
    /// Chunk bytes.
    pub data: Vec<u8>,
}

impl ContentChunk {
    /// Create a chunk.
    pub fn new(message_id: u64, offset: i32, data: Vec<u8>) -> Self {
        Self {
            message_id,
            offset,
            data,
        }
    }
}

/// A message as handed to the store for persistence.
///
/// The metadata bytes are opaque to the store; the routing attributes
/// (queue, destination, expiration) travel alongside them and are what the
/// store actually indexes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique, broker-assigned id. Ids grow over time, which is
    /// what makes range scans by id meaningful.
    pub message_id: u64,
    /// Storage queue the message belongs to.
    pub queue: String,
    /// Logical destination the message was published to. For retained
    /// messages this is the topic name.
    pub destination: String,
    /// Expiration timestamp in epoch milliseconds, if the message declares
    /// one.
    pub expiration_time: Option<i64>,
    /// Opaque serialized metadata.
    pub metadata: Vec<u8>,
    /// Payload chunks, ordered by offset.
    pub chunks: Vec<ContentChunk>,
}

impl Message {
    /// True when the message declares an expiration timestamp.
    pub fn has_expiration(&self) -> bool {
        self.expiration_time.is_some()
    }

    /// Total payload size in bytes.
    pub fn content_size(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.data.len()).sum()
    }

    /// True when the payload carries no bytes at all.
    ///
    /// A retained publish with an empty payload is a tombstone that removes
    /// the retained entry for its destination.
    pub fn payload_is_empty(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.data.is_empty())
    }
}

/// Metadata of a stored message, as returned by reads.
///
/// Reads recover the queue name from the row's queue id; the rest of the
/// message attributes live inside the opaque metadata bytes, which the
/// broker deserializes itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Message id.
    pub message_id: u64,
    /// Queue (or retained destination) the row belongs to.
    pub queue: String,
    /// Opaque serialized metadata.
    pub metadata: Vec<u8>,
}
