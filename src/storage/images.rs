use chrono::Utc;
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{FeatureMappingRecord, ImageRecord, MatchRecord};
use super::tables::*;
use crate::vector::{self, FaceVector};

/// Result of writing one image's vectors and matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        faces: usize,
        /// Match rows written (two per consolidated pair, minus conflicts)
        matches_inserted: usize,
        /// Match rows another writer had already stored
        conflicts: usize,
    },
    /// An `Image` row already existed; nothing was written.
    AlreadyCommitted,
}

impl Database {
    // ========================================================================
    // Processing result (one atomic transaction)
    // ========================================================================

    /// Persist the image row, one feature mapping per face vector and both
    /// directions of every consolidated match, all in a single transaction.
    ///
    /// Match inserts skip pairs that already exist, so two workers discovering
    /// the same pairing concurrently leave exactly one row per direction.
    pub fn commit_processing(
        &self,
        img_id: &str,
        face_vectors: &[FaceVector],
        matches: &[(String, f64)],
    ) -> Result<CommitOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;
        let now = Utc::now();

        {
            let mut images = write_txn.open_table(IMAGES)?;
            if images.get(img_id)?.is_some() {
                drop(images);
                write_txn.abort()?;
                return Ok(CommitOutcome::AlreadyCommitted);
            }
            let image = ImageRecord {
                img_id: img_id.to_string(),
                created_at: now,
            };
            let data = rmp_serde::to_vec_named(&image)?;
            images.insert(img_id, data.as_slice())?;
        }

        {
            let mut mappings = write_txn.open_table(FEATURE_MAPPINGS)?;
            let mut next_id = match mappings.last()? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            for face_vector in face_vectors {
                let mapping = FeatureMappingRecord {
                    img_id: img_id.to_string(),
                    features: vector::encode(face_vector),
                    created_at: now,
                };
                let data = rmp_serde::to_vec_named(&mapping)?;
                mappings.insert(next_id, data.as_slice())?;
                next_id += 1;
            }
        }

        let mut matches_inserted = 0;
        let mut conflicts = 0;
        {
            let mut table = write_txn.open_table(MATCHES)?;
            for (that_img_id, distance_score) in matches {
                debug_assert_ne!(img_id, that_img_id.as_str(), "self-matches are never stored");
                for (this, that) in [(img_id, that_img_id.as_str()), (that_img_id.as_str(), img_id)]
                {
                    if table.get((this, that))?.is_some() {
                        conflicts += 1;
                        continue;
                    }
                    let record = MatchRecord {
                        this_img_id: this.to_string(),
                        that_img_id: that.to_string(),
                        distance_score: *distance_score,
                        created_at: now,
                    };
                    let data = rmp_serde::to_vec_named(&record)?;
                    table.insert((this, that), data.as_slice())?;
                    matches_inserted += 1;
                }
            }
        }

        write_txn.commit()?;
        Ok(CommitOutcome::Committed {
            faces: face_vectors.len(),
            matches_inserted,
            conflicts,
        })
    }

    // ========================================================================
    // Read projections
    // ========================================================================

    /// Load every known face vector with its owning img_id. Full table scan.
    pub fn load_face_vectors(&self) -> Result<Vec<(String, FaceVector)>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FEATURE_MAPPINGS)?;

        let mut known = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let mapping: FeatureMappingRecord = rmp_serde::from_slice(value.value())?;
            known.push((mapping.img_id, vector::decode(&mapping.features)?));
        }

        Ok(known)
    }

    /// Face vectors stored for a single image, in insertion order
    pub fn face_vectors_of(&self, img_id: &str) -> Result<Vec<FaceVector>, DatabaseError> {
        Ok(self
            .load_face_vectors()?
            .into_iter()
            .filter(|(owner, _)| owner == img_id)
            .map(|(_, face_vector)| face_vector)
            .collect())
    }

    /// Get a processed image by its img_id
    pub fn get_image(&self, img_id: &str) -> Result<Option<ImageRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;

        match table.get(img_id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All processed images, ordered by img_id
    pub fn list_images(&self) -> Result<Vec<ImageRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;

        let mut images = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            images.push(rmp_serde::from_slice(value.value())?);
        }

        Ok(images)
    }

    /// Matches recorded with `img_id` on the "this" side
    pub fn matches_of(&self, img_id: &str) -> Result<Vec<MatchRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(MATCHES)?;

        let start: (&str, &str) = (img_id, "");
        let mut matches = Vec::new();
        for result in table.range(start..)? {
            let (key, value) = result?;
            if key.value().0 != img_id {
                break;
            }
            matches.push(rmp_serde::from_slice(value.value())?);
        }

        Ok(matches)
    }

    /// Every stored match row, in key order
    pub fn all_matches(&self) -> Result<Vec<MatchRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(MATCHES)?;

        let mut matches = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            matches.push(rmp_serde::from_slice(value.value())?);
        }

        Ok(matches)
    }
}
