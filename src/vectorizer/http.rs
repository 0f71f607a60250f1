use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{parse_output, VectorizeError, Vectorizer};
use crate::vector::FaceVector;

/// Posts the image location to a long-running vectorization service and
/// reads the same `faceVectors` document back.
pub struct HttpVectorizer {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct VectorizeRequest<'a> {
    path: &'a str,
}

impl HttpVectorizer {
    pub fn new(url: &str) -> Result<Self, VectorizeError> {
        let client = Client::builder()
            .build()
            .map_err(|e| VectorizeError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Vectorizer for HttpVectorizer {
    async fn vectorize(&self, path: &str) -> Result<Vec<FaceVector>, VectorizeError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&VectorizeRequest { path })
            .send()
            .await
            .map_err(|e| VectorizeError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VectorizeError::Backend(format!(
                "vectorizer at {} failed ({status}): {body}",
                self.url
            )));
        }

        let raw = resp
            .bytes()
            .await
            .map_err(|e| VectorizeError::Backend(e.to_string()))?;
        parse_output(&raw)
    }
}
