//! Core domain types for the silo message store.
//!
//! This crate defines the data model shared by the persistence layer and
//! its callers:
//! - Messages, payload chunks, and stored metadata
//! - Queue mappings and shard derivation
//! - Store configuration

pub mod config;
pub mod message;
pub mod queue;

pub use config::StoreConfig;
pub use message::{ContentChunk, Message, MessageMetadata};
pub use queue::{DLC_QUEUE_SUFFIX, QueueMapping, is_dlc_queue};
