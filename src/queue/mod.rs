//! External message queue carrying img_ids to the processing consumers.

mod local;
mod pubsub;

pub use local::LocalQueue;
pub use pubsub::PubSubQueue;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Queue backend error: {0}")]
    Backend(String),
    #[error("Malformed queue message: {0}")]
    Malformed(String),
}

/// A dequeued message. `receipt` is the backend handle needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub receipt: String,
    pub payload: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish a payload (an img_id).
    async fn put(&self, payload: &str) -> Result<(), QueueError>;
    /// Fetch up to `max_messages`. An empty vec means nothing is available.
    async fn fetch(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError>;
    /// Remove a fetched message so it is never redelivered.
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
