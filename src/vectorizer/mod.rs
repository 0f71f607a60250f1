//! Gateway to the external face vectorization backend.
//!
//! The backend is opaque: given the location of one image it returns zero or
//! more face vectors. Backends are swapped by configuration; the pipeline
//! never branches on which one is active.

mod command;
mod http;

pub use command::CommandVectorizer;
pub use http::HttpVectorizer;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::vector::FaceVector;

#[derive(Debug, Error)]
pub enum VectorizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Vectorizer backend error: {0}")]
    Backend(String),
    #[error("Malformed vectorizer output: {0}")]
    Malformed(String),
    #[error("Face vector has {actual} components, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// One vector per detected face. May be empty.
    async fn vectorize(&self, path: &str) -> Result<Vec<FaceVector>, VectorizeError>;
}

/// Backend output: one entry per input image, each a list of face vectors.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorizeOutput {
    #[serde(default)]
    face_vectors: Vec<Vec<FaceVector>>,
}

/// Parse `{"faceVectors": [[v1, v2, ...]]}` for a single input image.
pub(crate) fn parse_output(raw: &[u8]) -> Result<Vec<FaceVector>, VectorizeError> {
    let output: VectorizeOutput =
        serde_json::from_slice(raw).map_err(|e| VectorizeError::Malformed(e.to_string()))?;
    Ok(output.face_vectors.into_iter().next().unwrap_or_default())
}
