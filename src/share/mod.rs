//! Share payload boundary: a dataset compressed into a URL-embeddable string.
//!
//! The payload is JSON, zlib-deflated, then base64-encoded. Decoding reverses
//! the steps; timestamps come back as real instants through serde.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::models::UserMapData;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode a dataset as a compressed base64 payload.
pub fn encode(data: &[UserMapData]) -> Result<String, ShareError> {
    let json = serde_json::to_vec(data)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decode a payload produced by [`encode`].
pub fn decode(payload: &str) -> Result<Vec<UserMapData>, ShareError> {
    let compressed = STANDARD.decode(payload.trim())?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
