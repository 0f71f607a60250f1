use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::ImageStatusRecord;
use super::tables::*;
use crate::state_machine::ImageStatus;

/// Result of a guarded status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The row was in one of the accepted states and now holds the new one.
    Applied { from: ImageStatus },
    /// The row exists but was in a state the guard does not accept.
    Rejected { current: ImageStatus },
    /// No row for this img_id.
    Missing,
}

impl Database {
    // ========================================================================
    // Image status operations
    // ========================================================================

    /// Insert a status row unless one already exists for the img_id.
    /// Returns false when a row was already present, regardless of its stage.
    pub fn insert_status(&self, record: &ImageStatusRecord) -> Result<bool, DatabaseError> {
        debug_assert!(!record.img_id.is_empty(), "img_id must not be empty");

        let write_txn = self.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(IMAGE_STATUSES)?;
            if table.get(record.img_id.as_str())?.is_some() {
                false
            } else {
                let data = rmp_serde::to_vec_named(record)?;
                table.insert(record.img_id.as_str(), data.as_slice())?;
                true
            }
        };

        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    /// Get the status row for an image
    pub fn get_status(&self, img_id: &str) -> Result<Option<ImageStatusRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGE_STATUSES)?;

        match table.get(img_id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Check-and-set: move to `to` only if the current status is in `accepted`.
    /// The read and the write share one write transaction.
    pub fn transition_status(
        &self,
        img_id: &str,
        accepted: &[ImageStatus],
        to: ImageStatus,
        error_msg: Option<&str>,
    ) -> Result<Transition, DatabaseError> {
        let write_txn = self.begin_write()?;

        let transition = match read_status(&write_txn, img_id)? {
            None => Transition::Missing,
            Some(record) if !accepted.contains(&record.status) => Transition::Rejected {
                current: record.status,
            },
            Some(mut record) => {
                let from = record.status;
                record.status = to;
                record.error_msg = error_msg.map(|s| s.to_string());
                record.updated_at = Utc::now();
                write_status(&write_txn, &record)?;
                Transition::Applied { from }
            }
        };

        match transition {
            Transition::Applied { .. } => write_txn.commit()?,
            _ => write_txn.abort()?,
        }
        Ok(transition)
    }

    /// Unconditional status write. `error_msg` replaces whatever was stored.
    /// Returns false if the img_id has no status row.
    pub fn set_status(
        &self,
        img_id: &str,
        status: ImageStatus,
        error_msg: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let updated = match read_status(&write_txn, img_id)? {
            Some(mut record) => {
                record.status = status;
                record.error_msg = error_msg.map(|s| s.to_string());
                record.updated_at = Utc::now();
                write_status(&write_txn, &record)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(updated)
    }
}

fn read_status(
    write_txn: &WriteTransaction,
    img_id: &str,
) -> Result<Option<ImageStatusRecord>, DatabaseError> {
    let table = write_txn.open_table(IMAGE_STATUSES)?;
    let result = match table.get(img_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(result)
}

fn write_status(
    write_txn: &WriteTransaction,
    record: &ImageStatusRecord,
) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(IMAGE_STATUSES)?;
    let data = rmp_serde::to_vec_named(record)?;
    table.insert(record.img_id.as_str(), data.as_slice())?;
    Ok(())
}
