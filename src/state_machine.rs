//! Per-image lifecycle.
//!
//! ```text
//! uploaded -> queued -> processing -> face_vector_computed -> finished_processing
//! ```
//!
//! `finished_processing` is terminal and may carry a soft `error_msg`
//! ("No faces found in image", "Image processed before uploaded").
//! Guarded transitions are check-and-set inside a single redb write
//! transaction; `advance` is the pipeline's unconditional write.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::storage::models::ImageStatusRecord;
use crate::storage::{Database, DatabaseError, Transition};

pub const ENQUEUE_FAILED: &str = "img_id could not be added to queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Uploaded,
    Queued,
    Processing,
    FaceVectorComputed,
    FinishedProcessing,
}

impl ImageStatus {
    /// States an administrative requeue may reset.
    pub const NON_TERMINAL: [ImageStatus; 4] = [
        ImageStatus::Uploaded,
        ImageStatus::Queued,
        ImageStatus::Processing,
        ImageStatus::FaceVectorComputed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Uploaded => "uploaded",
            ImageStatus::Queued => "queued",
            ImageStatus::Processing => "processing",
            ImageStatus::FaceVectorComputed => "face_vector_computed",
            ImageStatus::FinishedProcessing => "finished_processing",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatus::FinishedProcessing)
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the status rows. Each call commits independently.
#[derive(Clone)]
pub struct StatusTracker {
    db: Database,
}

impl StatusTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an `uploaded` row. Fails with DuplicateImage if any row exists.
    pub fn create(
        &self,
        img_id: &str,
        object_key: &str,
    ) -> Result<ImageStatusRecord, DomainError> {
        let now = Utc::now();
        let record = ImageStatusRecord {
            img_id: img_id.to_string(),
            status: ImageStatus::Uploaded,
            error_msg: None,
            object_key: object_key.to_string(),
            created_at: now,
            updated_at: now,
        };

        if !self.db.insert_status(&record)? {
            return Err(DomainError::DuplicateImage(img_id.to_string()));
        }
        Ok(record)
    }

    /// Atomic `uploaded -> queued`.
    pub fn begin_processing(&self, img_id: &str) -> Result<(), DomainError> {
        match self.db.transition_status(
            img_id,
            &[ImageStatus::Uploaded],
            ImageStatus::Queued,
            None,
        )? {
            Transition::Applied { .. } => Ok(()),
            Transition::Rejected { .. } => {
                Err(DomainError::ImageAlreadyProcessed(img_id.to_string()))
            }
            Transition::Missing => Err(DomainError::ImageDoesNotExist(img_id.to_string())),
        }
    }

    /// Undo `begin_processing` after the enqueue itself failed.
    pub fn revert_enqueue(&self, img_id: &str) -> Result<(), DatabaseError> {
        self.db.transition_status(
            img_id,
            &[ImageStatus::Queued],
            ImageStatus::Uploaded,
            Some(ENQUEUE_FAILED),
        )?;
        Ok(())
    }

    /// Atomic `queued -> processing`. False means another consumer got there
    /// first or the row is not in the queued stage.
    pub fn claim(&self, img_id: &str) -> Result<bool, DatabaseError> {
        let transition = self.db.transition_status(
            img_id,
            &[ImageStatus::Queued],
            ImageStatus::Processing,
            None,
        )?;
        Ok(matches!(transition, Transition::Applied { .. }))
    }

    /// Unconditional write used by the pipeline, which drives it forward.
    pub fn advance(
        &self,
        img_id: &str,
        status: ImageStatus,
        error_msg: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if !self.db.set_status(img_id, status, error_msg)? {
            tracing::warn!(img_id = %img_id, status = %status, "No status row to advance");
        }
        Ok(())
    }

    pub fn read(&self, img_id: &str) -> Result<ImageStatusRecord, DomainError> {
        self.db
            .get_status(img_id)?
            .ok_or_else(|| DomainError::ImageDoesNotExist(img_id.to_string()))
    }

    /// Administrative reset of a stuck image back to `queued`.
    /// Returns the state it was reset from.
    pub fn requeue(&self, img_id: &str) -> Result<ImageStatus, DomainError> {
        match self.db.transition_status(
            img_id,
            &ImageStatus::NON_TERMINAL,
            ImageStatus::Queued,
            None,
        )? {
            Transition::Applied { from } => Ok(from),
            Transition::Rejected { .. } => {
                Err(DomainError::ImageAlreadyProcessed(img_id.to_string()))
            }
            Transition::Missing => Err(DomainError::ImageDoesNotExist(img_id.to_string())),
        }
    }
}
