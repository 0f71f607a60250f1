use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::matcher::MatchingEngine;
use crate::queue::{MessageQueue, QueueError};

/// Polls the queue and runs each delivered img_id through the engine, one at
/// a time. Scale out by running more consumers against the same queue.
pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    engine: MatchingEngine,
    batch_size: usize,
    poll_interval: Duration,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        engine: MatchingEngine,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            engine,
            batch_size,
            poll_interval,
        }
    }

    /// Fetch one batch and process it. Returns the number of messages fetched.
    ///
    /// Each message is deleted before it is processed, so a crash mid-image
    /// loses the delivery; the image is recovered with `requeue`.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        let messages = self.queue.fetch(self.batch_size).await?;

        for message in &messages {
            if let Err(e) = self.queue.delete(message).await {
                tracing::warn!(message_id = %message.id, error = %e, "Failed to delete message");
            }

            let img_id = message.payload.trim();
            if img_id.is_empty() {
                tracing::warn!(message_id = %message.id, "Dropping message without img_id");
                continue;
            }

            if let Err(e) = self.engine.process(img_id).await {
                tracing::error!(img_id = %img_id, error = %e, "Failed to process image");
            }
        }

        Ok(messages.len())
    }

    /// Poll until cancelled. The message in hand is always finished first.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Queue consumer started"
        );

        while !cancel.is_cancelled() {
            let fetched = match self.poll_once().await {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch from queue");
                    0
                }
            };

            if fetched == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        tracing::info!("Queue consumer stopped");
    }
}
