//! Best-effort compressing payload codec.
//!
//! Outbound snapshots are serialized to canonical JSON and deflated with
//! zlib. If the compressor fails the canonical bytes go out as-is, so the
//! wire contract is never broken by a codec fault. Decoding mirrors that:
//! input that does not inflate is treated as already-canonical and parsed
//! directly.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("payload is neither compressed nor canonical JSON: {0}")]
    Parse(#[source] serde_json::Error),
}

/// Serializes `value` and compresses the result. Compression failure falls
/// back to the uncompressed canonical bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let canonical = serde_json::to_vec(value).map_err(CodecError::Serialize)?;
    Ok(compress(&canonical).unwrap_or(canonical))
}

/// Inflates and parses `bytes`; input that is not in the compressed form is
/// parsed as canonical JSON directly, symmetric with the encoder fallback.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if let Ok(canonical) = decompress(bytes) {
        return serde_json::from_slice(&canonical).map_err(CodecError::Parse);
    }
    serde_json::from_slice(bytes).map_err(CodecError::Parse)
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut output)?;
    Ok(output)
}
