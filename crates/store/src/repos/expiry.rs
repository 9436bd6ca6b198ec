//! Expiry tracking repository.

use async_trait::async_trait;

use crate::error::StoreResult;

/// Repository for finding expired messages.
///
/// Expiry rows are written alongside message metadata and cleaned up by the
/// delete operations; these scans only read. A periodic sweeper feeds the
/// returned ids back into the delete operations.
#[async_trait]
pub trait ExpiryRepo: Send + Sync {
    /// Ids of queue messages whose expiration time has passed, at or after
    /// `lower_bound_id`, ordered by id. Messages parked in a dead letter
    /// channel are not reported here.
    async fn get_expired_messages(
        &self,
        queue: &str,
        lower_bound_id: u64,
        now_millis: i64,
    ) -> StoreResult<Vec<u64>>;

    /// Ids of expired messages parked in dead letter channels with expiry
    /// tracking enabled, ordered by id.
    async fn get_expired_in_dlc(&self, now_millis: i64) -> StoreResult<Vec<u64>>;
}
