//! Queue-to-shard routing.
//!
//! Queue names map to autoincremented ids in `queue_mappings`; the owning
//! shard is always `queue_id % table_groups` and is never persisted. The
//! router caches resolved mappings and collapses concurrent first lookups
//! for the same queue into a single database round trip.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use silo_core::QueueMapping;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::cache::WeightedLruCache;
use crate::error::{StoreError, StoreResult, is_unavailable, is_unique_violation};

const SELECT_QUEUE_ID: &str = "SELECT queue_id FROM queue_mappings WHERE queue_name = ?";
const INSERT_QUEUE: &str = "INSERT INTO queue_mappings (queue_name) VALUES (?)";

pub struct QueueRouter {
    pool: SqlitePool,
    table_groups: usize,
    mappings: Mutex<WeightedLruCache<String, QueueMapping>>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<QueueMapping>>>>,
}

impl QueueRouter {
    pub(crate) fn new(pool: SqlitePool, table_groups: usize, cache_weight: usize) -> Self {
        QueueRouter {
            pool,
            table_groups,
            mappings: Mutex::new(WeightedLruCache::new(cache_weight)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a queue name to its id and shard, creating the mapping row if
    /// the queue has never been seen.
    pub async fn resolve(&self, queue: &str) -> StoreResult<QueueMapping> {
        if let Some(mapping) = self.mappings.lock().get(queue).copied() {
            return Ok(mapping);
        }
        let cell = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(queue.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let result = cell.get_or_try_init(|| self.load(queue)).await.copied();
        // Cache before retiring the inflight cell; a resolver arriving in
        // between must find one of the two.
        if let Ok(mapping) = &result {
            self.mappings
                .lock()
                .put(queue.to_string(), *mapping, queue.len().max(1));
        }
        self.inflight.lock().remove(queue);
        result
    }

    /// Drop a cached mapping so the next resolve re-reads the database.
    pub fn invalidate(&self, queue: &str) {
        self.mappings.lock().remove(queue);
    }

    pub fn table_groups(&self) -> usize {
        self.table_groups
    }

    async fn load(&self, queue: &str) -> StoreResult<QueueMapping> {
        if let Some(queue_id) = self.select_queue_id(queue).await? {
            return Ok(QueueMapping::derive(queue_id, self.table_groups));
        }
        match sqlx::query(INSERT_QUEUE).bind(queue).execute(&self.pool).await {
            Ok(_) => {}
            Err(err) => match self.classify_insert(queue, err) {
                StoreError::DuplicateQueue(_) => {
                    tracing::debug!(queue, "queue mapping created concurrently");
                }
                other => return Err(other),
            },
        }
        match self.select_queue_id(queue).await? {
            Some(queue_id) => Ok(QueueMapping::derive(queue_id, self.table_groups)),
            None => Err(StoreError::Routing {
                queue: queue.to_string(),
                reason: "mapping row missing after insert".to_string(),
            }),
        }
    }

    async fn select_queue_id(&self, queue: &str) -> StoreResult<Option<i32>> {
        sqlx::query_scalar(SELECT_QUEUE_ID)
            .bind(queue)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| self.routing_error(queue, err))
    }

    fn classify_insert(&self, queue: &str, err: sqlx::Error) -> StoreError {
        if is_unique_violation(&err) {
            StoreError::DuplicateQueue(queue.to_string())
        } else {
            self.routing_error(queue, err)
        }
    }

    fn routing_error(&self, queue: &str, err: sqlx::Error) -> StoreError {
        if is_unavailable(&err) {
            StoreError::Unavailable(format!("resolve queue {queue}: {err}"))
        } else {
            StoreError::Routing {
                queue: queue.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
