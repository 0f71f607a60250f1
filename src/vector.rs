//! Face vector encoding and distance.
//!
//! Vectors are persisted in a versioned fixed-length binary layout:
//! `[version: u8][count: u32 LE][count x f32 LE]`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// One embedding per detected face.
pub type FaceVector = Vec<f32>;

const ENCODING_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum VectorCodecError {
    #[error("Unsupported vector encoding version: {0}")]
    UnsupportedVersion(u8),
    #[error("Encoded vector truncated: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Encode a face vector into its persisted form.
pub fn encode(vector: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + vector.len() * 4);
    buf.put_u8(ENCODING_VERSION);
    buf.put_u32_le(vector.len() as u32);
    for value in vector {
        buf.put_f32_le(*value);
    }
    buf.freeze()
}

/// Decode a persisted face vector.
pub fn decode(data: &[u8]) -> Result<FaceVector, VectorCodecError> {
    if data.len() < HEADER_LEN {
        return Err(VectorCodecError::Length {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }
    if data[0] != ENCODING_VERSION {
        return Err(VectorCodecError::UnsupportedVersion(data[0]));
    }

    let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
    let expected = HEADER_LEN + count * 4;
    if data.len() != expected {
        return Err(VectorCodecError::Length {
            expected,
            actual: data.len(),
        });
    }

    Ok(data[HEADER_LEN..]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Plain Euclidean norm of `a - b`, accumulated in f64.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "face vectors must share one length");
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
