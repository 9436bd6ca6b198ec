//! Message builders for store tests.

use silo_core::{ContentChunk, Message};

/// Build a message with a single payload chunk.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn message(message_id: u64, queue: &str, payload: &[u8]) -> Message {
    Message {
        message_id,
        queue: queue.to_string(),
        destination: queue.to_string(),
        expiration_time: None,
        metadata: format!("meta-{message_id}").into_bytes(),
        chunks: vec![ContentChunk::new(message_id, 0, payload.to_vec())],
    }
}

/// Build a message whose payload is split across several chunks at
/// cumulative byte offsets.
#[allow(dead_code)]
pub fn chunked_message(message_id: u64, queue: &str, parts: &[&[u8]]) -> Message {
    let mut offset = 0;
    let mut chunks = Vec::with_capacity(parts.len());
    for part in parts {
        chunks.push(ContentChunk::new(message_id, offset, part.to_vec()));
        offset += part.len() as i32;
    }
    Message {
        message_id,
        queue: queue.to_string(),
        destination: queue.to_string(),
        expiration_time: None,
        metadata: format!("meta-{message_id}").into_bytes(),
        chunks,
    }
}

/// Build a message carrying an expiration time in epoch milliseconds.
#[allow(dead_code)]
pub fn expiring_message(message_id: u64, queue: &str, expiration_time: i64) -> Message {
    Message {
        expiration_time: Some(expiration_time),
        ..message(message_id, queue, b"expiring payload")
    }
}
