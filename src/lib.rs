//! face-match - Face-vector extraction and incremental same-person matching
//!
//! This crate ingests uploaded images and builds a match graph across them with:
//! - A per-image lifecycle tracked in redb with atomic guarded transitions
//! - Queue-driven consumers (local redb queue or Google Cloud Pub/Sub)
//! - Swappable object storage (local filesystem, GCS) and vectorizer backends
//! - Symmetric, minimum-distance match records committed in one transaction
//! - REST API with multipart upload support

pub mod api;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod gcp;
pub mod matcher;
pub mod object_store;
pub mod queue;
pub mod state_machine;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod vector;
pub mod vectorizer;

use config::Config;
use domain::ImageService;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub images: ImageService,
}
