//! Per-image pipeline: vectorize the image, compare its faces against every
//! face seen so far and persist the consolidated, symmetric match set.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::object_store::ObjectStore;
use crate::state_machine::{ImageStatus, StatusTracker};
use crate::storage::{CommitOutcome, Database, DatabaseError};
use crate::vector::{euclidean_distance, FaceVector};
use crate::vectorizer::{VectorizeError, Vectorizer};

pub const NO_FACES_FOUND: &str = "No faces found in image";
pub const NOT_UPLOADED: &str = "Image processed before uploaded";

/// Failures that leave the image wherever the pipeline got to.
/// `requeue` is the way out.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Vectorizer error: {0}")]
    Vectorize(#[from] VectorizeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The image was not in the `queued` stage (stale or duplicate delivery).
    Skipped { status: Option<ImageStatus> },
    /// The blob could not be located; finished with `NOT_UPLOADED`.
    NotUploaded,
    Finished { faces: usize, matches: usize },
}

#[derive(Clone)]
pub struct MatchingEngine {
    db: Database,
    tracker: StatusTracker,
    object_store: Arc<dyn ObjectStore>,
    vectorizer: Arc<dyn Vectorizer>,
    distance_threshold: f64,
    embedding_size: usize,
}

impl MatchingEngine {
    pub fn new(
        db: Database,
        object_store: Arc<dyn ObjectStore>,
        vectorizer: Arc<dyn Vectorizer>,
        distance_threshold: f64,
        embedding_size: usize,
    ) -> Self {
        Self {
            tracker: StatusTracker::new(db.clone()),
            db,
            object_store,
            vectorizer,
            distance_threshold,
            embedding_size,
        }
    }

    pub async fn process(&self, img_id: &str) -> Result<ProcessOutcome, PipelineError> {
        let started = Instant::now();

        // Claim first: only one consumer moves an image out of `queued`
        if !self.tracker.claim(img_id)? {
            let status = self.db.get_status(img_id)?.map(|r| r.status);
            tracing::debug!(img_id = %img_id, status = ?status, "Skipping image not awaiting processing");
            return Ok(ProcessOutcome::Skipped { status });
        }
        tracing::info!(img_id = %img_id, "Processing image");

        let object_key = match self.db.get_status(img_id)? {
            Some(record) => record.object_key,
            None => return Ok(ProcessOutcome::Skipped { status: None }),
        };

        let path = match self.object_store.locate(&object_key).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(img_id = %img_id, object_key = %object_key, error = %e, "Image bytes not found");
                self.tracker
                    .advance(img_id, ImageStatus::FinishedProcessing, Some(NOT_UPLOADED))?;
                return Ok(ProcessOutcome::NotUploaded);
            }
        };

        let known = self.db.load_face_vectors()?;
        tracing::debug!(img_id = %img_id, known = known.len(), "Loaded known face vectors");

        let vectors = self.vectorizer.vectorize(&path).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.embedding_size) {
            return Err(VectorizeError::Dimension {
                expected: self.embedding_size,
                actual: bad.len(),
            }
            .into());
        }
        self.tracker
            .advance(img_id, ImageStatus::FaceVectorComputed, None)?;
        tracing::debug!(img_id = %img_id, faces = vectors.len(), "Computed face vectors");

        let matches: Vec<(String, f64)> =
            consolidate(img_id, &vectors, &known, self.distance_threshold)
                .into_iter()
                .collect();

        match self.db.commit_processing(img_id, &vectors, &matches)? {
            CommitOutcome::Committed {
                faces,
                matches_inserted,
                conflicts,
            } => {
                tracing::debug!(
                    img_id = %img_id,
                    faces,
                    matches_inserted,
                    conflicts,
                    "Committed face vectors and matches"
                );
            }
            CommitOutcome::AlreadyCommitted => {
                tracing::warn!(img_id = %img_id, "Vectors already committed, finishing only");
            }
        }

        let error_msg = vectors.is_empty().then_some(NO_FACES_FOUND);
        if error_msg.is_some() {
            tracing::warn!(img_id = %img_id, "No faces found in image");
        }
        self.tracker
            .advance(img_id, ImageStatus::FinishedProcessing, error_msg)?;

        if let Err(e) = self.object_store.delete(&object_key).await {
            tracing::warn!(img_id = %img_id, object_key = %object_key, error = %e, "Failed to delete processed image");
        }

        tracing::info!(
            img_id = %img_id,
            faces = vectors.len(),
            matches = matches.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Finished processing image"
        );

        Ok(ProcessOutcome::Finished {
            faces: vectors.len(),
            matches: matches.len(),
        })
    }
}

/// Reduce every (new face, known face) distance below `threshold` to one
/// minimum distance per other image. Known faces of `img_id` itself are
/// ignored.
pub fn consolidate(
    img_id: &str,
    new_vectors: &[FaceVector],
    known: &[(String, FaceVector)],
    threshold: f64,
) -> BTreeMap<String, f64> {
    let mut best: BTreeMap<String, f64> = BTreeMap::new();

    for vector in new_vectors {
        for (other_img_id, other) in known {
            if other_img_id == img_id {
                continue;
            }
            let distance = euclidean_distance(vector, other);
            if distance < threshold {
                best.entry(other_img_id.clone())
                    .and_modify(|d| *d = d.min(distance))
                    .or_insert(distance);
            }
        }
    }

    best
}
