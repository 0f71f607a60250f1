//! Guarded entry points for the HTTP layer: upload, trigger, requeue and the
//! read-only projections over statuses, images and matches.

mod error;

pub use error::DomainError;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::object_store::ObjectStore;
use crate::queue::MessageQueue;
use crate::state_machine::{ImageStatus, StatusTracker};
use crate::storage::models::{ImageRecord, ImageStatusRecord};
use crate::storage::Database;

/// One match as seen from the queried image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMatch {
    pub img_id: String,
    pub distance_score: f64,
}

#[derive(Clone)]
pub struct ImageService {
    db: Database,
    tracker: StatusTracker,
    object_store: Arc<dyn ObjectStore>,
    queue: Arc<dyn MessageQueue>,
    allowed_extensions: Vec<String>,
}

impl ImageService {
    pub fn new(
        db: Database,
        object_store: Arc<dyn ObjectStore>,
        queue: Arc<dyn MessageQueue>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            tracker: StatusTracker::new(db.clone()),
            db,
            object_store,
            queue,
            allowed_extensions,
        }
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Store the bytes and create the `uploaded` row. Returns the img_id.
    pub async fn upload(&self, data: Bytes, filename: &str) -> Result<String, DomainError> {
        let (img_id, extension) = parse_filename(filename, &self.allowed_extensions)?;

        // Re-uploads are rejected before the object store is touched
        if self.db.get_status(&img_id)?.is_some() {
            return Err(DomainError::DuplicateImage(img_id));
        }

        let object_key = format!("{}.{extension}", uuid::Uuid::new_v4());
        self.object_store.put(&object_key, data).await?;

        // create() re-checks; a concurrent upload of the same img_id may win
        if let Err(e) = self.tracker.create(&img_id, &object_key) {
            if let Err(cleanup) = self.object_store.delete(&object_key).await {
                tracing::warn!(
                    img_id = %img_id,
                    object_key = %object_key,
                    error = %cleanup,
                    "Failed to remove orphaned upload"
                );
            }
            return Err(e);
        }

        tracing::debug!(img_id = %img_id, object_key = %object_key, "Image uploaded");
        Ok(img_id)
    }

    /// Move an uploaded image to `queued` and hand it to the consumers.
    pub async fn trigger(&self, img_id: &str) -> Result<(), DomainError> {
        self.tracker.begin_processing(img_id)?;

        if let Err(e) = self.queue.put(img_id).await {
            tracing::error!(img_id = %img_id, error = %e, "Failed to enqueue image");
            if let Err(revert) = self.tracker.revert_enqueue(img_id) {
                tracing::error!(img_id = %img_id, error = %revert, "Failed to revert queued status");
            }
            return Err(e.into());
        }

        tracing::debug!(img_id = %img_id, "Image queued for processing");
        Ok(())
    }

    /// Reset an image stuck in a non-terminal state and enqueue it again.
    pub async fn requeue(&self, img_id: &str) -> Result<ImageStatus, DomainError> {
        let from = self.tracker.requeue(img_id)?;
        self.queue.put(img_id).await?;

        tracing::info!(img_id = %img_id, from = %from, "Image requeued");
        Ok(from)
    }

    pub fn status(&self, img_id: &str) -> Result<ImageStatusRecord, DomainError> {
        let record = self.tracker.read(img_id)?;
        tracing::debug!(img_id = %img_id, status = %record.status, "Read image status");
        Ok(record)
    }

    /// Images whose vectors have been computed
    pub fn list(&self) -> Result<Vec<ImageRecord>, DomainError> {
        let images = self.db.list_images()?;
        tracing::debug!(count = images.len(), "Listed images");
        Ok(images)
    }

    /// Matches recorded for `img_id`. Unknown ids have none.
    pub fn matches_of(&self, img_id: &str) -> Result<Vec<ImageMatch>, DomainError> {
        let matches: Vec<ImageMatch> = self
            .db
            .matches_of(img_id)?
            .into_iter()
            .map(|m| ImageMatch {
                img_id: m.that_img_id,
                distance_score: m.distance_score,
            })
            .collect();

        tracing::debug!(img_id = %img_id, count = matches.len(), "Looked up matches");
        Ok(matches)
    }
}

/// Split an upload filename into `(img_id, extension)`.
/// `img_id` is everything before the first dot.
pub fn parse_filename(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<(String, String), DomainError> {
    if filename.contains('/') || filename.contains('\\') {
        return Err(DomainError::InvalidFilename(format!(
            "'{filename}' must not contain path separators"
        )));
    }

    let (stem, _) = filename
        .split_once('.')
        .ok_or_else(|| DomainError::InvalidFilename(format!("'{filename}' has no extension")))?;
    if stem.trim().is_empty() {
        return Err(DomainError::InvalidFilename(format!(
            "'{filename}' has an empty name"
        )));
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !allowed_extensions.iter().any(|a| *a == extension) {
        return Err(DomainError::InvalidFilename(format!(
            "extension '{extension}' is not one of {}",
            allowed_extensions.join(", ")
        )));
    }

    let is_image = mime_guess::from_ext(&extension)
        .first()
        .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE);
    if !is_image {
        return Err(DomainError::InvalidFilename(format!(
            "'{extension}' is not an image type"
        )));
    }

    Ok((stem.to_string(), extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_img_id_is_text_before_first_dot() {
        assert_eq!(
            parse_filename("1.jpg", &allowed()).unwrap(),
            ("1".to_string(), "jpg".to_string())
        );
        assert_eq!(
            parse_filename("alice.v2.PNG", &allowed()).unwrap(),
            ("alice".to_string(), "png".to_string())
        );
    }

    #[test]
    fn test_rejects_bad_filenames() {
        for name in ["noext", ".jpg", "../etc/passwd.jpg", "a\\b.jpg", "doc.pdf"] {
            assert!(
                matches!(
                    parse_filename(name, &allowed()),
                    Err(DomainError::InvalidFilename(_))
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_allowed_extension_must_be_an_image() {
        let allowed = vec!["txt".to_string()];
        assert!(matches!(
            parse_filename("notes.txt", &allowed),
            Err(DomainError::InvalidFilename(_))
        ));
    }
}
