//! Retained message repository.

use std::collections::HashMap;

use async_trait::async_trait;
use silo_core::{ContentChunk, Message, MessageMetadata};

use crate::error::StoreResult;

/// Repository for per-destination retained messages.
///
/// Each destination holds at most one retained message. Storing a message
/// with an entirely empty payload clears the destination instead.
#[async_trait]
pub trait RetainedRepo: Send + Sync {
    /// Apply a batch of retained updates, one destination at a time, in a
    /// single transaction.
    ///
    /// Per destination this either creates the entry, replaces the backing
    /// message (keeping the destination's topic id stable), deletes the
    /// entry when the incoming payload is empty, or does nothing when an
    /// empty payload arrives for a destination with no entry.
    async fn store_retained(&self, updates: &HashMap<String, Message>) -> StoreResult<()>;

    /// Get the retained metadata for a destination, if any.
    async fn get_retained(&self, destination: &str) -> StoreResult<Option<MessageMetadata>>;

    /// List every destination that currently holds a retained message.
    async fn list_retained_destinations(&self) -> StoreResult<Vec<String>>;

    /// Get a retained message's payload chunks keyed by offset.
    async fn get_retained_content(
        &self,
        message_id: u64,
    ) -> StoreResult<HashMap<i32, ContentChunk>>;
}
