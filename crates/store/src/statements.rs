//! Precomputed SQL statements, one set per metadata/content shard.
//!
//! Table names cannot be bound as parameters, so every sharded statement is
//! rendered once at startup and looked up by shard id afterwards. Statements
//! over variable-length id lists keep a prefix here and append a placeholder
//! group at call time.

use crate::models::NOT_IN_DLC;

pub(crate) fn metadata_table(shard_id: i32) -> String {
    format!("metadata_{shard_id}")
}

pub(crate) fn content_table(shard_id: i32) -> String {
    format!("content_{shard_id}")
}

/// Renders `?, ?, ?` for a parameter list of length `n`.
pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// All statements bound to a single shard.
#[derive(Debug)]
pub(crate) struct ShardStatements {
    pub insert_metadata: String,
    pub insert_content: String,
    pub select_metadata: String,
    pub select_metadata_range: String,
    pub select_next_metadata: String,
    pub select_next_message_ids: String,
    pub select_dlc_metadata: String,
    pub select_dlc_metadata_for_queue: String,
    pub select_dlc_message_ids: String,
    pub select_message_exists: String,
    pub select_content: String,
    select_content_batch_prefix: String,
    pub update_queue: String,
    update_dlc_prefix: String,
    delete_from_queue_prefix: String,
    delete_dlc_prefix: String,
    pub clear_queue: String,
    pub clear_dlc: String,
    pub count_range: String,
    pub count_queue: String,
    pub count_queue_in_dlc: String,
    pub count_dlc: String,
    pub count_all_queues: String,
}

impl ShardStatements {
    fn new(shard_id: i32) -> Self {
        let meta = metadata_table(shard_id);
        let content = content_table(shard_id);
        ShardStatements {
            insert_metadata: format!(
                "INSERT INTO {meta} (message_id, queue_id, dlc_queue_id, metadata) \
                 VALUES (?, ?, {NOT_IN_DLC}, ?)"
            ),
            insert_content: format!(
                "INSERT INTO {content} (message_id, content_offset, content) VALUES (?, ?, ?)"
            ),
            select_metadata: format!(
                "SELECT m.message_id, m.queue_id, m.dlc_queue_id, m.metadata, q.queue_name \
                 FROM {meta} m \
                 LEFT JOIN queue_mappings q ON q.queue_id = m.queue_id \
                 WHERE m.message_id = ?"
            ),
            select_metadata_range: format!(
                "SELECT message_id, metadata FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC} \
                 AND message_id BETWEEN ? AND ? ORDER BY message_id"
            ),
            select_next_metadata: format!(
                "SELECT message_id, metadata FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC} \
                 AND message_id >= ? ORDER BY message_id LIMIT ?"
            ),
            select_next_message_ids: format!(
                "SELECT message_id FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC} \
                 AND message_id >= ? ORDER BY message_id LIMIT ?"
            ),
            select_dlc_metadata: format!(
                "SELECT message_id, metadata FROM {meta} \
                 WHERE dlc_queue_id = ? AND message_id >= ? ORDER BY message_id LIMIT ?"
            ),
            select_dlc_metadata_for_queue: format!(
                "SELECT message_id, metadata FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = ? \
                 AND message_id >= ? ORDER BY message_id LIMIT ?"
            ),
            select_dlc_message_ids: format!(
                "SELECT message_id FROM {meta} WHERE dlc_queue_id = ? ORDER BY message_id"
            ),
            select_message_exists: format!("SELECT 1 FROM {meta} WHERE message_id = ?"),
            select_content: format!(
                "SELECT message_id, content_offset, content FROM {content} \
                 WHERE message_id = ? AND content_offset = ?"
            ),
            select_content_batch_prefix: format!(
                "SELECT message_id, content_offset, content FROM {content} WHERE message_id IN "
            ),
            update_queue: format!(
                "UPDATE {meta} SET queue_id = ? WHERE message_id = ? AND queue_id = ?"
            ),
            update_dlc_prefix: format!("UPDATE {meta} SET dlc_queue_id = ? WHERE message_id IN "),
            delete_from_queue_prefix: format!(
                "DELETE FROM {meta} WHERE queue_id = ? AND message_id IN "
            ),
            delete_dlc_prefix: format!(
                "DELETE FROM {meta} WHERE dlc_queue_id <> {NOT_IN_DLC} AND message_id IN "
            ),
            clear_queue: format!(
                "DELETE FROM {meta} WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC}"
            ),
            clear_dlc: format!("DELETE FROM {meta} WHERE dlc_queue_id = ?"),
            count_range: format!(
                "SELECT COUNT(message_id) FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC} \
                 AND message_id BETWEEN ? AND ?"
            ),
            count_queue: format!(
                "SELECT COUNT(message_id) FROM {meta} \
                 WHERE queue_id = ? AND dlc_queue_id = {NOT_IN_DLC}"
            ),
            count_queue_in_dlc: format!(
                "SELECT COUNT(message_id) FROM {meta} WHERE queue_id = ? AND dlc_queue_id = ?"
            ),
            count_dlc: format!("SELECT COUNT(message_id) FROM {meta} WHERE dlc_queue_id = ?"),
            count_all_queues: format!(
                "SELECT q.queue_name, COUNT(m.message_id) AS message_count \
                 FROM queue_mappings q \
                 LEFT JOIN {meta} m ON m.queue_id = q.queue_id \
                 AND m.dlc_queue_id = {NOT_IN_DLC} \
                 GROUP BY q.queue_name"
            ),
        }
    }

    pub fn select_content_batch(&self, n: usize) -> String {
        format!(
            "{}({}) ORDER BY message_id, content_offset",
            self.select_content_batch_prefix,
            placeholders(n)
        )
    }

    pub fn update_dlc(&self, n: usize) -> String {
        format!("{}({})", self.update_dlc_prefix, placeholders(n))
    }

    pub fn delete_from_queue(&self, n: usize) -> String {
        format!("{}({})", self.delete_from_queue_prefix, placeholders(n))
    }

    pub fn delete_dlc(&self, n: usize) -> String {
        format!("{}({})", self.delete_dlc_prefix, placeholders(n))
    }
}

/// The full statement matrix for a database with `table_groups` shards.
#[derive(Debug)]
pub(crate) struct StatementSet {
    shards: Vec<ShardStatements>,
}

impl StatementSet {
    pub fn new(table_groups: usize) -> Self {
        let shards = (0..table_groups as i32).map(ShardStatements::new).collect();
        StatementSet { shards }
    }

    pub fn shard(&self, shard_id: i32) -> &ShardStatements {
        &self.shards[shard_id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardStatements> {
        self.shards.iter()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }
}
