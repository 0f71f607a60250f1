use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::queue::QueueError;
use crate::storage::DatabaseError;

/// Outcomes of the image operations. The first four are expected results the
/// caller reports back; the rest are infrastructure failures.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Image '{0}' has already been uploaded")]
    DuplicateImage(String),
    #[error("Image '{0}' does not exist")]
    ImageDoesNotExist(String),
    #[error("Image '{0}' has already been processed")]
    ImageAlreadyProcessed(String),
    #[error("Invalid image filename: {0}")]
    InvalidFilename(String),
    #[error("Storage error: {0}")]
    Storage(#[from] ObjectStoreError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
