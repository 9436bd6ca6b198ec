//! Message store trait and the SQLite implementation.
//!
//! Metadata and content rows are spread over a fixed number of shard table
//! pairs (`metadata_N`, `content_N`); a queue's shard is derived from its
//! queue id by the router and never persisted. Every write is transactional.
//! The read cache is populated only after a commit succeeds and invalidated
//! before any destructive commit, so a cache hit never outlives its row.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use silo_core::{ContentChunk, Message, MessageMetadata, QueueMapping, StoreConfig, is_dlc_queue};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};

use crate::cache::{MessageCache, message_cache_from_config};
use crate::error::{StoreError, StoreResult, is_integrity_violation, is_unique_violation};
use crate::models::{ContentRow, MetadataBlobRow, MetadataRow, QueueCountRow, RetainedPointerRow};
use crate::repos::{ContentRepo, ExpiryRepo, MessageRepo, QueueRepo, RetainedRepo};
use crate::router::QueueRouter;
use crate::statements::{StatementSet, content_table, metadata_table, placeholders};

/// SQLite rejects statements with more than 999 bound parameters; id lists
/// are chunked below that.
const BIND_LIMIT: usize = 900;

/// SQLite integers are signed 64 bit; message ids convert at the bind
/// boundary and decode back to `u64` when rows are read.
fn id_param(message_id: u64) -> i64 {
    message_id as i64
}

/// Combined message store trait.
#[async_trait]
pub trait MessageStore:
    QueueRepo + MessageRepo + ContentRepo + RetainedRepo + ExpiryRepo + Send + Sync
{
    /// Create any missing tables and indexes.
    async fn migrate(&self) -> StoreResult<()>;

    /// Round-trip a probe row to check the database is reachable and
    /// writable. Returns false instead of an error so health checks stay
    /// infallible.
    async fn is_operational(&self, probe_value: &str, probe_time: i64) -> bool;
}

/// SQLite-backed message store.
pub struct SqliteMessageStore {
    pool: Pool<Sqlite>,
    router: QueueRouter,
    cache: Arc<dyn MessageCache>,
    statements: StatementSet,
}

impl SqliteMessageStore {
    /// Open (or create) the database and prepare all tables.
    pub async fn new(config: &StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::Config)?;

        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}?mode=rwc",
            config.path.display()
        ))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        // Prevent transient "database is locked" errors under concurrent access.
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a small pool avoids
            // persistent "database is locked" failures under load.
            .max_connections(config.max_connections)
            .connect_with(opts)
            .await?;

        let router =
            QueueRouter::new(pool.clone(), config.table_groups, config.queue_cache_weight);
        let cache = message_cache_from_config(config.message_cache_weight);
        let statements = StatementSet::new(config.table_groups);

        let store = Self {
            pool,
            router,
            cache,
            statements,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Get a reference to the queue router.
    pub fn router(&self) -> &QueueRouter {
        &self.router
    }

    /// Insert one message's metadata, content, and expiry rows into an open
    /// transaction. Returns the raw driver error so callers can react to
    /// integrity violations.
    async fn insert_message_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        mapping: QueueMapping,
        message: &Message,
    ) -> Result<(), sqlx::Error> {
        let stmts = self.statements.shard(mapping.shard_id);
        sqlx::query(&stmts.insert_metadata)
            .bind(id_param(message.message_id))
            .bind(mapping.queue_id)
            .bind(&message.metadata)
            .execute(&mut **tx)
            .await?;
        for chunk in &message.chunks {
            sqlx::query(&stmts.insert_content)
                .bind(id_param(chunk.message_id))
                .bind(chunk.offset)
                .bind(&chunk.data)
                .execute(&mut **tx)
                .await?;
        }
        if let Some(expiration_time) = message.expiration_time {
            sqlx::query(
                "INSERT INTO expiry_data (message_id, expiration_time, queue_name, in_dlc) \
                 VALUES (?, ?, ?, 0)",
            )
            .bind(id_param(message.message_id))
            .bind(expiration_time)
            .bind(&message.queue)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Locate the shard holding a message's metadata row, if any.
    async fn find_message_shard(&self, message_id: u64) -> StoreResult<Option<i32>> {
        for (shard_id, stmts) in self.statements.iter().enumerate() {
            let exists: Option<i32> = sqlx::query_scalar(&stmts.select_message_exists)
                .bind(id_param(message_id))
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_some() {
                return Ok(Some(shard_id as i32));
            }
        }
        Ok(None)
    }

    async fn delete_expiry_rows(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        message_ids: &[u64],
    ) -> Result<(), sqlx::Error> {
        let sql = format!(
            "DELETE FROM expiry_data WHERE message_id IN ({})",
            placeholders(message_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for &message_id in message_ids {
            query = query.bind(id_param(message_id));
        }
        query.execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_retained_content(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        message: &Message,
    ) -> Result<(), sqlx::Error> {
        for chunk in &message.chunks {
            sqlx::query(
                "INSERT INTO retained_content (message_id, content_offset, content) \
                 VALUES (?, ?, ?)",
            )
            .bind(id_param(chunk.message_id))
            .bind(chunk.offset)
            .bind(&chunk.data)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn probe_round_trip(&self, probe_value: &str, probe_time: i64) -> StoreResult<()> {
        sqlx::query("INSERT OR REPLACE INTO store_probe (probe_value, probe_time) VALUES (?, ?)")
            .bind(probe_value)
            .bind(probe_time)
            .execute(&self.pool)
            .await?;
        let read_back: Option<String> = sqlx::query_scalar(
            "SELECT probe_value FROM store_probe WHERE probe_value = ? AND probe_time = ?",
        )
        .bind(probe_value)
        .bind(probe_time)
        .fetch_optional(&self.pool)
        .await?;
        if read_back.is_none() {
            return Err(StoreError::Persistence(
                "probe row not readable after insert".to_string(),
            ));
        }
        sqlx::query("DELETE FROM store_probe WHERE probe_value = ? AND probe_time = ?")
            .bind(probe_value)
            .bind(probe_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        for shard_id in 0..self.statements.len() {
            sqlx::query(&shard_schema(shard_id as i32))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn is_operational(&self, probe_value: &str, probe_time: i64) -> bool {
        match self.probe_round_trip(probe_value, probe_time).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "store probe failed");
                false
            }
        }
    }
}

// Implement all the repository traits for SqliteMessageStore
mod sqlite_impl {
    use super::*;

    #[async_trait]
    impl QueueRepo for SqliteMessageStore {
        async fn add_queue(&self, queue: &str) -> StoreResult<()> {
            self.router.resolve(queue).await?;
            Ok(())
        }

        async fn remove_queue(&self, queue: &str) -> StoreResult<()> {
            self.router.invalidate(queue);
            let result = sqlx::query("DELETE FROM queue_mappings WHERE queue_name = ?")
                .bind(queue)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() > 0 {
                tracing::info!(queue, "removed queue mapping");
            }
            Ok(())
        }

        fn invalidate_queue_cache(&self, queue: &str) {
            self.router.invalidate(queue);
        }
    }

    #[async_trait]
    impl MessageRepo for SqliteMessageStore {
        async fn store_messages(&self, messages: &[Message]) -> StoreResult<()> {
            if messages.is_empty() {
                return Ok(());
            }
            let mut mappings: HashMap<&str, QueueMapping> = HashMap::new();
            for message in messages {
                if !mappings.contains_key(message.queue.as_str()) {
                    let mapping = self.router.resolve(&message.queue).await?;
                    mappings.insert(message.queue.as_str(), mapping);
                }
            }

            let mut tx = self.pool.begin().await?;
            let mut failure: Option<sqlx::Error> = None;
            for message in messages {
                let mapping = mappings[message.queue.as_str()];
                if let Err(err) = self.insert_message_tx(&mut tx, mapping, message).await {
                    failure = Some(err);
                    break;
                }
            }

            match failure {
                None => {
                    tx.commit().await?;
                    for message in messages {
                        self.cache.put(message);
                    }
                    tracing::debug!(count = messages.len(), "stored message batch");
                    Ok(())
                }
                Some(err) if is_integrity_violation(&err) || is_unique_violation(&err) => {
                    tx.rollback().await?;
                    let batch_err = StoreError::TransientBatchFailure(err.to_string());
                    tracing::warn!(
                        error = %batch_err,
                        count = messages.len(),
                        "message batch rejected, retrying one at a time"
                    );
                    for message in messages {
                        self.store_message(message).await?;
                    }
                    Ok(())
                }
                Some(err) => Err(err.into()),
            }
        }

        async fn store_message(&self, message: &Message) -> StoreResult<()> {
            let mapping = self.router.resolve(&message.queue).await?;
            let mut tx = self.pool.begin().await?;
            match self.insert_message_tx(&mut tx, mapping, message).await {
                Ok(()) => {
                    tx.commit().await?;
                    self.cache.put(message);
                    Ok(())
                }
                Err(err) if is_integrity_violation(&err) || is_unique_violation(&err) => {
                    tx.rollback().await?;
                    tracing::warn!(
                        message_id = message.message_id,
                        queue = %message.queue,
                        error = %err,
                        "dropping message rejected by an integrity constraint"
                    );
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }

        async fn get_metadata(&self, message_id: u64) -> StoreResult<Option<MessageMetadata>> {
            if let Some(message) = self.cache.get(message_id) {
                return Ok(Some(MessageMetadata {
                    message_id: message.message_id,
                    queue: message.queue,
                    metadata: message.metadata,
                }));
            }
            for stmts in self.statements.iter() {
                let row = sqlx::query_as::<_, MetadataRow>(&stmts.select_metadata)
                    .bind(id_param(message_id))
                    .fetch_optional(&self.pool)
                    .await?;
                if let Some(row) = row {
                    return Ok(Some(row.into_metadata()));
                }
            }
            Ok(None)
        }

        async fn get_metadata_range(
            &self,
            queue: &str,
            first_message_id: u64,
            last_message_id: u64,
        ) -> StoreResult<Vec<MessageMetadata>> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            let rows = sqlx::query_as::<_, MetadataBlobRow>(&stmts.select_metadata_range)
                .bind(mapping.queue_id)
                .bind(id_param(first_message_id))
                .bind(id_param(last_message_id))
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|row| row.into_metadata(queue)).collect())
        }

        async fn get_next_metadata_from_queue(
            &self,
            queue: &str,
            first_message_id: u64,
            limit: u32,
        ) -> StoreResult<Vec<MessageMetadata>> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            let rows = sqlx::query_as::<_, MetadataBlobRow>(&stmts.select_next_metadata)
                .bind(mapping.queue_id)
                .bind(id_param(first_message_id))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|row| row.into_metadata(queue)).collect())
        }

        async fn get_next_message_ids_from_queue(
            &self,
            queue: &str,
            first_message_id: u64,
            limit: u32,
        ) -> StoreResult<Vec<u64>> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            let ids: Vec<u64> = sqlx::query_scalar(&stmts.select_next_message_ids)
                .bind(mapping.queue_id)
                .bind(id_param(first_message_id))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            Ok(ids)
        }

        async fn get_metadata_in_dlc(
            &self,
            dlc_queue: &str,
            first_message_id: u64,
            limit: u32,
        ) -> StoreResult<Vec<MessageMetadata>> {
            let dlc = self.router.resolve(dlc_queue).await?;
            let mut rows: Vec<MetadataBlobRow> = Vec::new();
            for stmts in self.statements.iter() {
                let mut shard_rows = sqlx::query_as::<_, MetadataBlobRow>(&stmts.select_dlc_metadata)
                    .bind(dlc.queue_id)
                    .bind(id_param(first_message_id))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?;
                rows.append(&mut shard_rows);
            }
            rows.sort_by_key(|row| row.message_id);
            rows.truncate(limit as usize);
            Ok(rows
                .into_iter()
                .map(|row| row.into_metadata(dlc_queue))
                .collect())
        }

        async fn get_metadata_in_dlc_for_queue(
            &self,
            queue: &str,
            dlc_queue: &str,
            first_message_id: u64,
            limit: u32,
        ) -> StoreResult<Vec<MessageMetadata>> {
            let origin = self.router.resolve(queue).await?;
            let dlc = self.router.resolve(dlc_queue).await?;
            let stmts = self.statements.shard(origin.shard_id);
            let rows = sqlx::query_as::<_, MetadataBlobRow>(&stmts.select_dlc_metadata_for_queue)
                .bind(origin.queue_id)
                .bind(dlc.queue_id)
                .bind(id_param(first_message_id))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|row| row.into_metadata(queue)).collect())
        }

        async fn move_to_queue(
            &self,
            message_id: u64,
            from_queue: &str,
            to_queue: &str,
        ) -> StoreResult<()> {
            let from = self.router.resolve(from_queue).await?;
            let to = self.router.resolve(to_queue).await?;
            self.cache.invalidate(message_id);

            if from.shard_id == to.shard_id {
                let stmts = self.statements.shard(from.shard_id);
                let result = sqlx::query(&stmts.update_queue)
                    .bind(to.queue_id)
                    .bind(id_param(message_id))
                    .bind(from.queue_id)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() == 0 {
                    tracing::debug!(
                        message_id,
                        from_queue,
                        "message not moved, no longer in source queue"
                    );
                }
                return Ok(());
            }

            // Target lives in a different table pair: relocate the rows.
            let copy_metadata = format!(
                "INSERT INTO {} (message_id, queue_id, dlc_queue_id, metadata) \
                 SELECT message_id, ?, dlc_queue_id, metadata FROM {} \
                 WHERE message_id = ? AND queue_id = ?",
                metadata_table(to.shard_id),
                metadata_table(from.shard_id)
            );
            let copy_content = format!(
                "INSERT INTO {} (message_id, content_offset, content) \
                 SELECT message_id, content_offset, content FROM {} WHERE message_id = ?",
                content_table(to.shard_id),
                content_table(from.shard_id)
            );
            let delete_metadata = format!(
                "DELETE FROM {} WHERE message_id = ?",
                metadata_table(from.shard_id)
            );

            let mut tx = self.pool.begin().await?;
            let copied = sqlx::query(&copy_metadata)
                .bind(to.queue_id)
                .bind(id_param(message_id))
                .bind(from.queue_id)
                .execute(&mut *tx)
                .await?;
            if copied.rows_affected() == 0 {
                tx.rollback().await?;
                tracing::debug!(
                    message_id,
                    from_queue,
                    "message not moved, no longer in source queue"
                );
                return Ok(());
            }
            sqlx::query(&copy_content)
                .bind(id_param(message_id))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&delete_metadata)
                .bind(id_param(message_id))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }

        async fn move_to_dlc(
            &self,
            message_ids: &[u64],
            dlc_queue: &str,
            expire_in_dlc: bool,
        ) -> StoreResult<()> {
            if message_ids.is_empty() {
                return Ok(());
            }
            let dlc = self.router.resolve(dlc_queue).await?;
            self.cache.invalidate_many(message_ids);

            let mut tx = self.pool.begin().await?;
            let mut moved = 0u64;
            for batch in message_ids.chunks(BIND_LIMIT) {
                for stmts in self.statements.iter() {
                    let sql = stmts.update_dlc(batch.len());
                    let mut query = sqlx::query(&sql).bind(dlc.queue_id);
                    for &message_id in batch {
                        query = query.bind(id_param(message_id));
                    }
                    moved += query.execute(&mut *tx).await?.rows_affected();
                }
                // With expiry tracking the rows follow the messages into the
                // channel; without it the rows are dropped so parked messages
                // never expire.
                if expire_in_dlc {
                    let sql = format!(
                        "UPDATE expiry_data SET in_dlc = 1 WHERE message_id IN ({})",
                        placeholders(batch.len())
                    );
                    let mut query = sqlx::query(&sql);
                    for &message_id in batch {
                        query = query.bind(id_param(message_id));
                    }
                    query.execute(&mut *tx).await?;
                } else {
                    self.delete_expiry_rows(&mut tx, batch).await?;
                }
            }
            tx.commit().await?;
            tracing::debug!(count = moved, dlc_queue, "moved messages to dead letter channel");
            Ok(())
        }

        async fn delete_messages(&self, queue: &str, message_ids: &[u64]) -> StoreResult<()> {
            if message_ids.is_empty() {
                return Ok(());
            }
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            self.cache.invalidate_many(message_ids);

            let mut tx = self.pool.begin().await?;
            let mut deleted = 0u64;
            for batch in message_ids.chunks(BIND_LIMIT) {
                self.delete_expiry_rows(&mut tx, batch).await?;
                let sql = stmts.delete_from_queue(batch.len());
                let mut query = sqlx::query(&sql).bind(mapping.queue_id);
                for &message_id in batch {
                    query = query.bind(id_param(message_id));
                }
                deleted += query.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            tracing::debug!(count = deleted, queue, "deleted messages");
            Ok(())
        }

        async fn delete_dlc_messages(&self, message_ids: &[u64]) -> StoreResult<()> {
            if message_ids.is_empty() {
                return Ok(());
            }
            self.cache.invalidate_many(message_ids);

            let mut tx = self.pool.begin().await?;
            let mut deleted = 0u64;
            for batch in message_ids.chunks(BIND_LIMIT) {
                self.delete_expiry_rows(&mut tx, batch).await?;
                for stmts in self.statements.iter() {
                    let sql = stmts.delete_dlc(batch.len());
                    let mut query = sqlx::query(&sql);
                    for &message_id in batch {
                        query = query.bind(id_param(message_id));
                    }
                    deleted += query.execute(&mut *tx).await?.rows_affected();
                }
            }
            tx.commit().await?;
            tracing::debug!(count = deleted, "deleted dead letter messages");
            Ok(())
        }

        async fn clear_queue(&self, queue: &str) -> StoreResult<u64> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            self.cache.clear();

            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM expiry_data WHERE queue_name = ? AND in_dlc = 0")
                .bind(queue)
                .execute(&mut *tx)
                .await?;
            let deleted = sqlx::query(&stmts.clear_queue)
                .bind(mapping.queue_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            tracing::info!(count = deleted, queue, "purged queue");
            Ok(deleted)
        }

        async fn clear_dlc(&self, dlc_queue: &str) -> StoreResult<u64> {
            let dlc = self.router.resolve(dlc_queue).await?;

            let mut tx = self.pool.begin().await?;
            let mut parked: Vec<u64> = Vec::new();
            for stmts in self.statements.iter() {
                let mut ids: Vec<u64> = sqlx::query_scalar(&stmts.select_dlc_message_ids)
                    .bind(dlc.queue_id)
                    .fetch_all(&mut *tx)
                    .await?;
                parked.append(&mut ids);
            }
            for batch in parked.chunks(BIND_LIMIT) {
                self.delete_expiry_rows(&mut tx, batch).await?;
            }
            let mut deleted = 0u64;
            for stmts in self.statements.iter() {
                deleted += sqlx::query(&stmts.clear_dlc)
                    .bind(dlc.queue_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            self.cache.invalidate_many(&parked);
            tx.commit().await?;
            tracing::info!(count = deleted, dlc_queue, "purged dead letter channel");
            Ok(deleted)
        }

        async fn count_in_range(
            &self,
            queue: &str,
            first_message_id: u64,
            last_message_id: u64,
        ) -> StoreResult<i64> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            let count: i64 = sqlx::query_scalar(&stmts.count_range)
                .bind(mapping.queue_id)
                .bind(id_param(first_message_id))
                .bind(id_param(last_message_id))
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn count_for_queue(&self, queue: &str) -> StoreResult<i64> {
            let mapping = self.router.resolve(queue).await?;
            let stmts = self.statements.shard(mapping.shard_id);
            let count: i64 = sqlx::query_scalar(&stmts.count_queue)
                .bind(mapping.queue_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn count_for_all_queues(
            &self,
            queues: &[String],
        ) -> StoreResult<HashMap<String, i64>> {
            let mut counts: HashMap<String, i64> = queues
                .iter()
                .filter(|queue| !is_dlc_queue(queue))
                .map(|queue| (queue.clone(), 0))
                .collect();
            if counts.is_empty() {
                return Ok(counts);
            }
            for stmts in self.statements.iter() {
                let rows = sqlx::query_as::<_, QueueCountRow>(&stmts.count_all_queues)
                    .fetch_all(&self.pool)
                    .await?;
                for row in rows {
                    if let Some(count) = counts.get_mut(&row.queue_name) {
                        *count += row.message_count;
                    }
                }
            }
            Ok(counts)
        }

        async fn count_for_queue_in_dlc(&self, queue: &str, dlc_queue: &str) -> StoreResult<i64> {
            let origin = self.router.resolve(queue).await?;
            let dlc = self.router.resolve(dlc_queue).await?;
            let stmts = self.statements.shard(origin.shard_id);
            let count: i64 = sqlx::query_scalar(&stmts.count_queue_in_dlc)
                .bind(origin.queue_id)
                .bind(dlc.queue_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn count_in_dlc(&self, dlc_queue: &str) -> StoreResult<i64> {
            let dlc = self.router.resolve(dlc_queue).await?;
            let mut total = 0i64;
            for stmts in self.statements.iter() {
                let count: i64 = sqlx::query_scalar(&stmts.count_dlc)
                    .bind(dlc.queue_id)
                    .fetch_one(&self.pool)
                    .await?;
                total += count;
            }
            Ok(total)
        }
    }

    #[async_trait]
    impl ContentRepo for SqliteMessageStore {
        async fn store_chunks(&self, chunks: &[ContentChunk]) -> StoreResult<()> {
            if chunks.is_empty() {
                return Ok(());
            }
            let mut by_message: HashMap<u64, Vec<&ContentChunk>> = HashMap::new();
            for chunk in chunks {
                by_message.entry(chunk.message_id).or_default().push(chunk);
            }
            let mut shards: HashMap<u64, i32> = HashMap::new();
            for &message_id in by_message.keys() {
                let shard_id = self.find_message_shard(message_id).await?.ok_or_else(|| {
                    StoreError::IntegrityViolation(format!(
                        "no metadata row for message {message_id}"
                    ))
                })?;
                shards.insert(message_id, shard_id);
            }

            let mut tx = self.pool.begin().await?;
            for (message_id, message_chunks) in &by_message {
                let stmts = self.statements.shard(shards[message_id]);
                for chunk in message_chunks {
                    sqlx::query(&stmts.insert_content)
                        .bind(id_param(chunk.message_id))
                        .bind(chunk.offset)
                        .bind(&chunk.data)
                        .execute(&mut *tx)
                        .await?;
                }
            }
            tx.commit().await?;
            Ok(())
        }

        async fn get_chunk(
            &self,
            message_id: u64,
            offset: i32,
        ) -> StoreResult<Option<ContentChunk>> {
            if let Some(chunk) = self.cache.get_chunk(message_id, offset) {
                return Ok(Some(chunk));
            }
            for stmts in self.statements.iter() {
                let row = sqlx::query_as::<_, ContentRow>(&stmts.select_content)
                    .bind(id_param(message_id))
                    .bind(offset)
                    .fetch_optional(&self.pool)
                    .await?;
                if let Some(row) = row {
                    return Ok(Some(row.into_chunk()));
                }
            }
            Ok(None)
        }

        async fn get_chunks_batch(
            &self,
            ids_by_queue: &HashMap<String, Vec<u64>>,
        ) -> StoreResult<HashMap<u64, Vec<ContentChunk>>> {
            let mut result: HashMap<u64, Vec<ContentChunk>> = HashMap::new();
            for (queue, message_ids) in ids_by_queue {
                if message_ids.is_empty() {
                    continue;
                }
                let mapping = self.router.resolve(queue).await?;
                let stmts = self.statements.shard(mapping.shard_id);
                for batch in message_ids.chunks(BIND_LIMIT) {
                    let sql = stmts.select_content_batch(batch.len());
                    let mut query = sqlx::query_as::<_, ContentRow>(&sql);
                    for &message_id in batch {
                        query = query.bind(id_param(message_id));
                    }
                    let rows = query.fetch_all(&self.pool).await?;
                    for row in rows {
                        result
                            .entry(row.message_id)
                            .or_default()
                            .push(row.into_chunk());
                    }
                }
            }
            Ok(result)
        }
    }

    #[async_trait]
    impl RetainedRepo for SqliteMessageStore {
        async fn store_retained(&self, updates: &HashMap<String, Message>) -> StoreResult<()> {
            if updates.is_empty() {
                return Ok(());
            }
            let mut tx = self.pool.begin().await?;
            for (destination, message) in updates {
                let existing = sqlx::query_as::<_, RetainedPointerRow>(
                    "SELECT topic_id, message_id FROM retained_metadata WHERE destination = ?",
                )
                .bind(destination)
                .fetch_optional(&mut *tx)
                .await?;

                match (existing, message.payload_is_empty()) {
                    (Some(pointer), true) => {
                        sqlx::query("DELETE FROM retained_content WHERE message_id = ?")
                            .bind(id_param(pointer.message_id))
                            .execute(&mut *tx)
                            .await?;
                        sqlx::query("DELETE FROM retained_metadata WHERE topic_id = ?")
                            .bind(pointer.topic_id)
                            .execute(&mut *tx)
                            .await?;
                        tracing::debug!(destination, "cleared retained message");
                    }
                    (Some(pointer), false) => {
                        sqlx::query(
                            "UPDATE retained_metadata SET message_id = ?, metadata = ? \
                             WHERE topic_id = ?",
                        )
                        .bind(id_param(message.message_id))
                        .bind(&message.metadata)
                        .bind(pointer.topic_id)
                        .execute(&mut *tx)
                        .await?;
                        sqlx::query("DELETE FROM retained_content WHERE message_id = ?")
                            .bind(id_param(pointer.message_id))
                            .execute(&mut *tx)
                            .await?;
                        self.insert_retained_content(&mut tx, message).await?;
                    }
                    (None, false) => {
                        sqlx::query(
                            "INSERT INTO retained_metadata (destination, message_id, metadata) \
                             VALUES (?, ?, ?)",
                        )
                        .bind(destination)
                        .bind(id_param(message.message_id))
                        .bind(&message.metadata)
                        .execute(&mut *tx)
                        .await?;
                        self.insert_retained_content(&mut tx, message).await?;
                    }
                    (None, true) => {
                        tracing::debug!(destination, "no retained message to clear");
                    }
                }
            }
            tx.commit().await?;
            Ok(())
        }

        async fn get_retained(&self, destination: &str) -> StoreResult<Option<MessageMetadata>> {
            let row = sqlx::query_as::<_, MetadataBlobRow>(
                "SELECT message_id, metadata FROM retained_metadata WHERE destination = ?",
            )
            .bind(destination)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|row| row.into_metadata(destination)))
        }

        async fn list_retained_destinations(&self) -> StoreResult<Vec<String>> {
            let destinations: Vec<String> = sqlx::query_scalar(
                "SELECT destination FROM retained_metadata ORDER BY destination",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(destinations)
        }

        async fn get_retained_content(
            &self,
            message_id: u64,
        ) -> StoreResult<HashMap<i32, ContentChunk>> {
            let rows = sqlx::query_as::<_, ContentRow>(
                "SELECT message_id, content_offset, content FROM retained_content \
                 WHERE message_id = ?",
            )
            .bind(id_param(message_id))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| (row.content_offset, row.into_chunk()))
                .collect())
        }
    }

    #[async_trait]
    impl ExpiryRepo for SqliteMessageStore {
        async fn get_expired_messages(
            &self,
            queue: &str,
            lower_bound_id: u64,
            now_millis: i64,
        ) -> StoreResult<Vec<u64>> {
            let ids: Vec<u64> = sqlx::query_scalar(
                "SELECT message_id FROM expiry_data \
                 WHERE expiration_time < ? AND message_id >= ? AND queue_name = ? AND in_dlc = 0 \
                 ORDER BY message_id",
            )
            .bind(now_millis)
            .bind(id_param(lower_bound_id))
            .bind(queue)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }

        async fn get_expired_in_dlc(&self, now_millis: i64) -> StoreResult<Vec<u64>> {
            let ids: Vec<u64> = sqlx::query_scalar(
                "SELECT message_id FROM expiry_data \
                 WHERE expiration_time < ? AND in_dlc = 1 ORDER BY message_id",
            )
            .bind(now_millis)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Queue name registry. Ids are engine-assigned; a queue's shard is always
-- queue_id modulo the configured table-group count.
CREATE TABLE IF NOT EXISTS queue_mappings (
    queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name TEXT NOT NULL UNIQUE
);

-- One row per message written with an expiration time.
CREATE TABLE IF NOT EXISTS expiry_data (
    message_id INTEGER PRIMARY KEY,
    expiration_time INTEGER NOT NULL,
    queue_name TEXT NOT NULL,
    in_dlc INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_expiry_data_expiration_time
    ON expiry_data (expiration_time);

-- Retained message pointers, one per destination.
CREATE TABLE IF NOT EXISTS retained_metadata (
    topic_id INTEGER PRIMARY KEY AUTOINCREMENT,
    destination TEXT NOT NULL UNIQUE,
    message_id INTEGER NOT NULL,
    metadata BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS retained_content (
    message_id INTEGER NOT NULL,
    content_offset INTEGER NOT NULL,
    content BLOB NOT NULL,
    PRIMARY KEY (message_id, content_offset)
);

-- Scratch rows for connectivity probes.
CREATE TABLE IF NOT EXISTS store_probe (
    probe_value TEXT NOT NULL,
    probe_time INTEGER NOT NULL,
    PRIMARY KEY (probe_value, probe_time)
);
"#;

fn shard_schema(shard_id: i32) -> String {
    let meta = metadata_table(shard_id);
    let content = content_table(shard_id);
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {meta} (
    message_id INTEGER PRIMARY KEY,
    queue_id INTEGER NOT NULL REFERENCES queue_mappings (queue_id),
    dlc_queue_id INTEGER NOT NULL DEFAULT -1,
    metadata BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{meta}_queue ON {meta} (queue_id, message_id);

CREATE INDEX IF NOT EXISTS idx_{meta}_dlc ON {meta} (dlc_queue_id);

CREATE TABLE IF NOT EXISTS {content} (
    message_id INTEGER NOT NULL REFERENCES {meta} (message_id) ON DELETE CASCADE,
    content_offset INTEGER NOT NULL,
    content BLOB NOT NULL,
    PRIMARY KEY (message_id, content_offset)
);
"#
    )
}
