//! Splits a byte payload into transport-sized text frames and back.
//!
//! Every block of at most `max_chunk_size` bytes is base64-encoded on its
//! own, so each frame survives a text-only link. Decoding concatenates the
//! frames in arrival order; ordering and exactly-once delivery are the
//! transport's job.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::ScanLogRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("chunk {index} is malformed: {reason}")]
    MalformedChunk { index: usize, reason: String },
    #[error("payload is not a valid record list: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    max_chunk_size: usize,
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self {
            max_chunk_size: rollcall_config::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkCodec {
    pub fn new(max_chunk_size: usize) -> Result<Self, CodecError> {
        if max_chunk_size == 0 {
            return Err(CodecError::InvalidChunkSize);
        }
        Ok(Self { max_chunk_size })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn encode(&self, bytes: &[u8]) -> Vec<String> {
        bytes
            .chunks(self.max_chunk_size)
            .map(|block| STANDARD.encode(block))
            .collect()
    }

    pub fn decode<S: AsRef<str>>(&self, chunks: &[S]) -> Result<Vec<u8>, CodecError> {
        decode(chunks)
    }

    /// JSON-serialize records, then chunk the bytes.
    pub fn encode_records(&self, records: &[ScanLogRecord]) -> Result<Vec<String>, CodecError> {
        let json = serde_json::to_vec(records).map_err(|e| CodecError::Payload(e.to_string()))?;
        Ok(self.encode(&json))
    }

    pub fn decode_records<S: AsRef<str>>(
        &self,
        chunks: &[S],
    ) -> Result<Vec<ScanLogRecord>, CodecError> {
        let bytes = self.decode(chunks)?;
        serde_json::from_slice(&bytes).map_err(|e| CodecError::Payload(e.to_string()))
    }
}

pub fn encode(bytes: &[u8], max_chunk_size: usize) -> Result<Vec<String>, CodecError> {
    Ok(ChunkCodec::new(max_chunk_size)?.encode(bytes))
}

/// Reassemble frames produced by [`encode`]. Any malformed frame fails the whole payload.
pub fn decode<S: AsRef<str>>(chunks: &[S]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        STANDARD
            .decode_vec(chunk.as_ref().as_bytes(), &mut out)
            .map_err(|e| CodecError::MalformedChunk {
                index,
                reason: e.to_string(),
            })?;
    }
    Ok(out)
}
