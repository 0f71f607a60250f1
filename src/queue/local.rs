use async_trait::async_trait;
use std::time::Duration;

use super::{MessageQueue, QueueError, QueueMessage};
use crate::storage::Database;

/// Queue stored in the service's own redb database. Suitable when the API and
/// all consumers share one process.
pub struct LocalQueue {
    db: Database,
    visibility_timeout: chrono::Duration,
}

impl LocalQueue {
    pub fn new(db: Database, visibility_timeout: Duration) -> Self {
        let visibility_timeout = chrono::Duration::from_std(visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(86_400));
        Self {
            db,
            visibility_timeout,
        }
    }

    pub fn len(&self) -> Result<u64, QueueError> {
        Ok(self.db.queued_message_count()?)
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl MessageQueue for LocalQueue {
    async fn put(&self, payload: &str) -> Result<(), QueueError> {
        let id = self.db.enqueue_message(payload)?;
        tracing::debug!(message_id = id, "Enqueued message");
        Ok(())
    }

    async fn fetch(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let leased = self
            .db
            .lease_messages(max_messages, self.visibility_timeout)?;

        Ok(leased
            .into_iter()
            .map(|m| {
                if m.dequeue_count > 1 {
                    tracing::warn!(
                        message_id = m.id,
                        dequeue_count = m.dequeue_count,
                        "Redelivering message whose lease expired"
                    );
                }
                QueueMessage {
                    id: m.id.to_string(),
                    receipt: m.id.to_string(),
                    payload: m.payload,
                }
            })
            .collect())
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let id: u64 = message
            .receipt
            .parse()
            .map_err(|_| QueueError::Malformed(format!("bad receipt '{}'", message.receipt)))?;
        if !self.db.remove_message(id)? {
            tracing::debug!(message_id = id, "Message already deleted");
        }
        Ok(())
    }
}
