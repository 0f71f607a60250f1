use bytes::Bytes;
use face_match::object_store::{LocalStore, ObjectStore, ObjectStoreError};

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from_static(b"\xff\xd8\xff\xe0 jpeg bytes");
    store.put("0b9c.jpg", data.clone()).await.unwrap();

    assert!(store.exists("0b9c.jpg").await.unwrap());
    assert_eq!(store.get("0b9c.jpg").await.unwrap(), data);
}

#[tokio::test]
async fn test_local_store_locate_returns_absolute_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();
    store.put("face.png", Bytes::from("png")).await.unwrap();

    let path = store.locate("face.png").await.unwrap();
    let path = std::path::Path::new(&path);
    assert!(path.is_absolute());
    assert!(path.ends_with("face.png"));
    assert_eq!(std::fs::read(path).unwrap(), b"png");
}

#[tokio::test]
async fn test_local_store_locate_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.locate("never-uploaded.jpg").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(key)) if key == "never-uploaded.jpg"));
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("done.jpg", Bytes::from("data")).await.unwrap();
    store.delete("done.jpg").await.unwrap();

    assert!(!store.exists("done.jpg").await.unwrap());
    assert!(store.locate("done.jpg").await.is_err());
}

#[tokio::test]
async fn test_local_store_delete_nonexistent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    // Processed images are deleted best-effort; a second delete is fine
    store.delete("nonexistent.jpg").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.get("missing.jpg").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_creates_base_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = LocalStore::new(&nested).unwrap();

    store.put("x.jpg", Bytes::from("x")).await.unwrap();
    assert!(nested.join("x.jpg").is_file());
}
