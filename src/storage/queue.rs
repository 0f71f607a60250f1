use chrono::{Duration, Utc};
use redb::{ReadableTable, ReadableTableMetadata};

use super::db::{Database, DatabaseError};
use super::models::QueuedMessageRecord;
use super::tables::*;

/// A message handed out by `lease_messages`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedMessage {
    pub id: u64,
    pub payload: String,
    pub dequeue_count: u32,
}

impl Database {
    // ========================================================================
    // Local queue operations
    // ========================================================================

    /// Append a message, visible immediately
    pub fn enqueue_message(&self, payload: &str) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let id = {
            let mut table = write_txn.open_table(LOCAL_QUEUE)?;
            let id = match table.last()? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            let now = Utc::now();
            let record = QueuedMessageRecord {
                payload: payload.to_string(),
                enqueued_at: now,
                visible_at: now,
                dequeue_count: 0,
            };
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id, data.as_slice())?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    /// Hand out up to `max` visible messages in FIFO order and hide them for
    /// `visibility`. Messages not removed before the lease ends reappear.
    pub fn lease_messages(
        &self,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let now = Utc::now();

        let mut leased: Vec<(u64, QueuedMessageRecord)> = Vec::new();
        {
            let table = write_txn.open_table(LOCAL_QUEUE)?;
            for result in table.iter()? {
                if leased.len() >= max {
                    break;
                }
                let (key, value) = result?;
                let record: QueuedMessageRecord = rmp_serde::from_slice(value.value())?;
                if record.visible_at <= now {
                    leased.push((key.value(), record));
                }
            }
        }

        if leased.is_empty() {
            write_txn.abort()?;
            return Ok(Vec::new());
        }

        let mut messages = Vec::with_capacity(leased.len());
        {
            let mut table = write_txn.open_table(LOCAL_QUEUE)?;
            for (id, mut record) in leased {
                record.visible_at = now + visibility;
                record.dequeue_count += 1;
                let data = rmp_serde::to_vec_named(&record)?;
                table.insert(id, data.as_slice())?;
                messages.push(LeasedMessage {
                    id,
                    payload: record.payload,
                    dequeue_count: record.dequeue_count,
                });
            }
        }

        write_txn.commit()?;
        Ok(messages)
    }

    /// Remove a message. Returns false if it was already gone.
    pub fn remove_message(&self, id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(LOCAL_QUEUE)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Number of messages held, leased or not
    pub fn queued_message_count(&self) -> Result<u64, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(LOCAL_QUEUE)?;
        Ok(table.len()?)
    }
}
