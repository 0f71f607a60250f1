use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use face_match::consumer::QueueConsumer;
use face_match::domain::{DomainError, ImageService};
use face_match::matcher::{MatchingEngine, NOT_UPLOADED, NO_FACES_FOUND};
use face_match::object_store::{LocalStore, ObjectStore};
use face_match::queue::{LocalQueue, MessageQueue, QueueError, QueueMessage};
use face_match::state_machine::{ImageStatus, ENQUEUE_FAILED};
use face_match::storage::Database;
use face_match::vector::FaceVector;
use face_match::vectorizer::{VectorizeError, Vectorizer};
use tokio_util::sync::CancellationToken;

/// Test images are JSON arrays of face vectors
struct JsonFileVectorizer;

#[async_trait]
impl Vectorizer for JsonFileVectorizer {
    async fn vectorize(&self, path: &str) -> Result<Vec<FaceVector>, VectorizeError> {
        let raw = tokio::fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|e| VectorizeError::Malformed(e.to_string()))
    }
}

/// A queue whose backend is always down
struct UnreachableQueue;

#[async_trait]
impl MessageQueue for UnreachableQueue {
    async fn put(&self, _payload: &str) -> Result<(), QueueError> {
        Err(QueueError::Backend("connection refused".to_string()))
    }

    async fn fetch(&self, _max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        Err(QueueError::Backend("connection refused".to_string()))
    }

    async fn delete(&self, _message: &QueueMessage) -> Result<(), QueueError> {
        Err(QueueError::Backend("connection refused".to_string()))
    }
}

fn image(faces: &[Vec<f32>]) -> Bytes {
    Bytes::from(serde_json::to_vec(faces).unwrap())
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Database,
    store: Arc<LocalStore>,
    queue: Arc<LocalQueue>,
    images: ImageService,
    engine: MatchingEngine,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("files")).unwrap());
        let queue = Arc::new(LocalQueue::new(db.clone(), Duration::from_secs(30)));

        let images = ImageService::new(
            db.clone(),
            store.clone(),
            queue.clone(),
            vec!["jpg".to_string(), "png".to_string()],
        );
        let engine = MatchingEngine::new(
            db.clone(),
            store.clone(),
            Arc::new(JsonFileVectorizer),
            0.6,
            2,
        );

        Self {
            _dir: dir,
            db,
            store,
            queue,
            images,
            engine,
        }
    }

    fn consumer(&self) -> QueueConsumer {
        QueueConsumer::new(
            self.queue.clone(),
            self.engine.clone(),
            32,
            Duration::from_millis(10),
        )
    }

    async fn upload_and_trigger(&self, filename: &str, faces: &[Vec<f32>]) -> String {
        let img_id = self.images.upload(image(faces), filename).await.unwrap();
        self.images.trigger(&img_id).await.unwrap();
        img_id
    }

    fn status(&self, img_id: &str) -> (ImageStatus, Option<String>) {
        let record = self.images.status(img_id).unwrap();
        (record.status, record.error_msg)
    }
}

#[tokio::test]
async fn test_same_person_scenario() {
    let h = Harness::new();
    h.upload_and_trigger("1.jpg", &[vec![0.10, 0.20]]).await;
    h.upload_and_trigger("2.jpg", &[vec![0.15, 0.25]]).await;

    assert_eq!(h.consumer().poll_once().await.unwrap(), 2);

    assert_eq!(h.status("1"), (ImageStatus::FinishedProcessing, None));
    assert_eq!(h.status("2"), (ImageStatus::FinishedProcessing, None));

    let of_1 = h.images.matches_of("1").unwrap();
    let of_2 = h.images.matches_of("2").unwrap();
    assert_eq!(of_1.len(), 1);
    assert_eq!(of_2.len(), 1);
    assert_eq!(of_1[0].img_id, "2");
    assert_eq!(of_2[0].img_id, "1");
    assert_eq!(of_1[0].distance_score, of_2[0].distance_score);

    let listed: Vec<String> = h.images.list().unwrap().into_iter().map(|i| i.img_id).collect();
    assert_eq!(listed, vec!["1", "2"]);
}

#[tokio::test]
async fn test_match_graph_is_symmetric_without_self_matches() {
    let h = Harness::new();
    h.upload_and_trigger("a.jpg", &[vec![0.0, 0.0], vec![0.05, 0.0]]).await;
    h.upload_and_trigger("b.jpg", &[vec![0.1, 0.0]]).await;
    h.upload_and_trigger("c.jpg", &[vec![0.2, 0.0], vec![5.0, 5.0]]).await;
    h.upload_and_trigger("far.jpg", &[vec![9.0, -9.0]]).await;

    h.consumer().poll_once().await.unwrap();

    let all = h.db.all_matches().unwrap();
    assert_eq!(all.len(), 6);
    for m in &all {
        assert_ne!(m.this_img_id, m.that_img_id);
        let mirror = h
            .db
            .matches_of(&m.that_img_id)
            .unwrap()
            .into_iter()
            .find(|r| r.that_img_id == m.this_img_id)
            .expect("mirror row exists");
        assert_eq!(mirror.distance_score, m.distance_score);
    }
    assert!(h.images.matches_of("far").unwrap().is_empty());
}

#[tokio::test]
async fn test_multi_face_match_keeps_minimum_distance() {
    let h = Harness::new();
    h.upload_and_trigger("d.jpg", &[vec![0.0, 0.0]]).await;
    h.consumer().poll_once().await.unwrap();

    h.upload_and_trigger("c.jpg", &[vec![0.3, 0.0], vec![0.0, 0.5]])
        .await;
    h.consumer().poll_once().await.unwrap();

    for (this, that) in [("c", "d"), ("d", "c")] {
        let matches = h.images.matches_of(this).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].img_id, that);
        assert!((matches[0].distance_score - 0.3).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_zero_faces_is_soft_terminal() {
    let h = Harness::new();
    h.upload_and_trigger("empty.png", &[]).await;
    h.consumer().poll_once().await.unwrap();

    assert_eq!(
        h.status("empty"),
        (
            ImageStatus::FinishedProcessing,
            Some(NO_FACES_FOUND.to_string())
        )
    );
    assert_eq!(h.images.list().unwrap().len(), 1);
    assert!(h.db.face_vectors_of("empty").unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_blob_is_soft_terminal() {
    let h = Harness::new();
    let img_id = h.images.upload(image(&[vec![0.0, 0.0]]), "lost.jpg").await.unwrap();
    let object_key = h.images.status(&img_id).unwrap().object_key;
    h.store.delete(&object_key).await.unwrap();
    h.images.trigger(&img_id).await.unwrap();

    h.consumer().poll_once().await.unwrap();

    assert_eq!(
        h.status("lost"),
        (
            ImageStatus::FinishedProcessing,
            Some(NOT_UPLOADED.to_string())
        )
    );
    assert!(h.images.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_processed_blob_is_deleted() {
    let h = Harness::new();
    let img_id = h.upload_and_trigger("gone.jpg", &[vec![0.0, 0.0]]).await;
    let object_key = h.images.status(&img_id).unwrap().object_key;
    assert!(h.store.exists(&object_key).await.unwrap());

    h.consumer().poll_once().await.unwrap();
    assert!(!h.store.exists(&object_key).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_upload_is_rejected() {
    let h = Harness::new();
    h.images.upload(image(&[]), "1.jpg").await.unwrap();

    let err = h.images.upload(image(&[]), "1.png").await.unwrap_err();
    assert!(matches!(err, DomainError::DuplicateImage(id) if id == "1"));
}

#[tokio::test]
async fn test_trigger_guards() {
    let h = Harness::new();
    assert!(matches!(
        h.images.trigger("never").await,
        Err(DomainError::ImageDoesNotExist(_))
    ));

    h.images.upload(image(&[]), "1.jpg").await.unwrap();
    h.images.trigger("1").await.unwrap();
    assert!(matches!(
        h.images.trigger("1").await,
        Err(DomainError::ImageAlreadyProcessed(_))
    ));
    assert_eq!(h.queue.len().unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_delivery_is_skipped() {
    let h = Harness::new();
    let img_id = h.upload_and_trigger("1.jpg", &[vec![0.0, 0.0]]).await;
    // Same img_id delivered twice
    h.queue.put(&img_id).await.unwrap();

    assert_eq!(h.consumer().poll_once().await.unwrap(), 2);
    assert_eq!(h.db.face_vectors_of("1").unwrap().len(), 1);
    assert!(h.queue.is_empty().unwrap());
}

#[tokio::test]
async fn test_failed_enqueue_reverts_to_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = Arc::new(LocalStore::new(dir.path().join("files")).unwrap());
    let images = ImageService::new(
        db,
        store,
        Arc::new(UnreachableQueue),
        vec!["jpg".to_string()],
    );

    images.upload(image(&[]), "1.jpg").await.unwrap();
    let err = images.trigger("1").await.unwrap_err();
    assert!(matches!(err, DomainError::Queue(_)));

    let record = images.status("1").unwrap();
    assert_eq!(record.status, ImageStatus::Uploaded);
    assert_eq!(record.error_msg.as_deref(), Some(ENQUEUE_FAILED));
}

#[tokio::test]
async fn test_requeue_recovers_stuck_image() {
    let h = Harness::new();
    h.upload_and_trigger("stuck.jpg", &[vec![0.0, 0.0]]).await;

    // A consumer took the message and claimed the image, then died
    let lost = h.queue.fetch(1).await.unwrap();
    h.queue.delete(&lost[0]).await.unwrap();
    assert!(h.images.tracker().claim("stuck").unwrap());

    assert_eq!(h.images.requeue("stuck").await.unwrap(), ImageStatus::Processing);
    h.consumer().poll_once().await.unwrap();
    assert_eq!(h.status("stuck"), (ImageStatus::FinishedProcessing, None));

    assert!(matches!(
        h.images.requeue("stuck").await,
        Err(DomainError::ImageAlreadyProcessed(_))
    ));
}

#[tokio::test]
async fn test_consumer_run_until_cancelled() {
    let h = Harness::new();
    h.upload_and_trigger("1.jpg", &[vec![0.0, 0.0]]).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(h.consumer().run(cancel.clone()));

    let mut finished = false;
    for _ in 0..200 {
        if h.status("1").0 == ImageStatus::FinishedProcessing {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    handle.await.unwrap();
    assert!(finished);
}
