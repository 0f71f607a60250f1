use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use super::{ObjectStore, ObjectStoreError};
use crate::gcp::GcpAuth;

const STORAGE_API: &str = "https://storage.googleapis.com";

/// Google Cloud Storage backend over the JSON API. `locate` hands the
/// vectorizer a `https://storage.googleapis.com/<bucket>/<key>` URL.
pub struct GcsStore {
    bucket: String,
    client: Client,
    auth: GcpAuth,
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;
        let auth = GcpAuth::new(client.clone(), credentials_file).await?;

        Ok(Self {
            bucket: bucket.to_string(),
            client,
            auth,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{STORAGE_API}/storage/v1/b/{}/o/{key}", self.bucket)
    }

    /// Authorized request against the bucket
    async fn request(&self, method: Method, url: String) -> Result<RequestBuilder, ObjectStoreError> {
        let token = self
            .auth
            .token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("GCS auth failed: {e}")))?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send(request: RequestBuilder, action: &str) -> Result<Response, ObjectStoreError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("GCS {action} failed: {e}")))?;

        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(ObjectStoreError::Backend(format!(
            "GCS {action} failed ({status}): {body}"
        )))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();
        let url = format!(
            "{STORAGE_API}/upload/storage/v1/b/{}/o?uploadType=media&name={key}",
            self.bucket
        );
        let request = self
            .request(Method::POST, url)
            .await?
            .header("Content-Type", content_type.as_ref())
            .body(data);

        Self::send(request, "upload").await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let request = self
            .request(Method::GET, format!("{}?alt=media", self.object_url(key)))
            .await?;

        match Self::send(request, "download").await {
            Ok(resp) => resp
                .bytes()
                .await
                .map_err(|e| ObjectStoreError::Backend(e.to_string())),
            Err(_) if !self.exists(key).await? => Err(ObjectStoreError::NotFound(key.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resp = self
            .request(Method::DELETE, self.object_url(key))
            .await?
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // Already gone counts as deleted
        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            status => Err(ObjectStoreError::Backend(format!(
                "GCS delete of {key} failed ({status})"
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let resp = self
            .request(Method::GET, self.object_url(key))
            .await?
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ObjectStoreError::Backend(format!(
                "GCS metadata lookup of {key} failed ({status})"
            ))),
        }
    }

    async fn locate(&self, key: &str) -> Result<String, ObjectStoreError> {
        if !self.exists(key).await? {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        Ok(format!("{STORAGE_API}/{}/{key}", self.bucket))
    }
}
