//! Shared test helpers for face-match unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{
    Config, MatcherConfig, NodeConfig, QueueConfig, StorageConfig, VectorizerConfig, WorkerConfig,
};
use crate::domain::ImageService;
use crate::matcher::MatchingEngine;
use crate::object_store::LocalStore;
use crate::queue::LocalQueue;
use crate::storage::Database;
use crate::vector::FaceVector;
use crate::vectorizer::{VectorizeError, Vectorizer};
use crate::AppState;

pub const TEST_EMBEDDING_SIZE: usize = 2;

/// Test "images" are JSON arrays of face vectors; this vectorizer reads them back.
pub struct JsonFileVectorizer;

#[async_trait]
impl Vectorizer for JsonFileVectorizer {
    async fn vectorize(&self, path: &str) -> Result<Vec<FaceVector>, VectorizeError> {
        let raw = tokio::fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|e| VectorizeError::Malformed(e.to_string()))
    }
}

/// Image bytes understood by `JsonFileVectorizer`
pub fn face_image(faces: &[Vec<f32>]) -> Bytes {
    Bytes::from(serde_json::to_vec(faces).expect("vectors serialize"))
}

pub struct TestContext {
    pub state: Arc<AppState>,
    pub engine: MatchingEngine,
    pub queue: Arc<LocalQueue>,
}

/// Create a test AppState with a temporary database, local object store and
/// local queue, plus an engine wired to the same backends.
pub fn test_context(temp_dir: &tempfile::TempDir) -> TestContext {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig::default(),
        queue: QueueConfig::default(),
        matcher: MatcherConfig {
            distance_threshold: 0.6,
            embedding_size: TEST_EMBEDDING_SIZE,
        },
        vectorizer: VectorizerConfig::default(),
        worker: WorkerConfig::default(),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        allowed_extensions: vec!["jpg".to_string(), "png".to_string()],
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));
    let queue = Arc::new(LocalQueue::new(db.clone(), config.queue.visibility_timeout()));

    let engine = MatchingEngine::new(
        db.clone(),
        object_store.clone(),
        Arc::new(JsonFileVectorizer),
        config.matcher.distance_threshold,
        config.matcher.embedding_size,
    );

    let images = ImageService::new(
        db.clone(),
        object_store,
        queue.clone(),
        config.allowed_extensions.clone(),
    );

    TestContext {
        state: Arc::new(AppState { config, db, images }),
        engine,
        queue,
    }
}
