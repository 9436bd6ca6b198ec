//! Queue naming and shard routing types.

use serde::{Deserialize, Serialize};

/// Name suffix marking a queue as a dead-letter channel.
pub const DLC_QUEUE_SUFFIX: &str = ".dlc";

/// True when the queue name denotes a dead-letter channel.
pub fn is_dlc_queue(queue_name: &str) -> bool {
    queue_name.ends_with(DLC_QUEUE_SUFFIX)
}

/// Resolved routing entry for a queue.
///
/// The shard id is always derived from the queue id and is never persisted,
/// so the two cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMapping {
    /// Engine-assigned queue id.
    pub queue_id: i32,
    /// Shard whose tables hold the queue's rows: `queue_id mod table_groups`.
    pub shard_id: i32,
}

impl QueueMapping {
    /// Derive the mapping for a queue id given the table-group count.
    pub fn derive(queue_id: i32, table_groups: usize) -> Self {
        Self {
            queue_id,
            shard_id: queue_id % table_groups as i32,
        }
    }
}
