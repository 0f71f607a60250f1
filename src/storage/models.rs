use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::ImageStatus;

/// Lifecycle row for one upload, keyed by img_id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageStatusRecord {
    pub img_id: String,
    pub status: ImageStatus,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Object store key holding the uploaded bytes
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An image whose face vectors have been computed. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub img_id: String,
    pub created_at: DateTime<Utc>,
}

/// One detected face of one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMappingRecord {
    pub img_id: String,
    /// Vector in the `crate::vector` binary encoding
    pub features: Bytes,
    pub created_at: DateTime<Utc>,
}

/// One direction of a symmetric match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub this_img_id: String,
    pub that_img_id: String,
    pub distance_score: f64,
    pub created_at: DateTime<Utc>,
}

/// A message held by the local queue backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessageRecord {
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    /// Hidden from `fetch` until this instant (lease after a fetch)
    pub visible_at: DateTime<Utc>,
    #[serde(default)]
    pub dequeue_count: u32,
}
