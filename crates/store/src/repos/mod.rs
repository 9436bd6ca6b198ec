//! Repository traits for message store operations.

pub mod content;
pub mod expiry;
pub mod messages;
pub mod queues;
pub mod retained;

pub use content::ContentRepo;
pub use expiry::ExpiryRepo;
pub use messages::MessageRepo;
pub use queues::QueueRepo;
pub use retained::RetainedRepo;
