//! Key encoding and decoding for the storage layer.
//!
//! Event key format: `evt:{sequence:020}`
//! - sequence: monotonic insertion counter, zero-padded to 20 digits so
//!   lexicographic order equals insertion order
//!
//! Id key format: `id:{ulid}`, value is the big-endian sequence.

use ulid::Ulid;

use crate::error::StorageError;

/// Key for event documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub sequence: u64,
}

impl EventKey {
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("evt:{:020}", self.sequence).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let sequence = s
            .strip_prefix("evt:")
            .ok_or_else(|| StorageError::Key(format!("Invalid event key format: {}", s)))?
            .parse::<u64>()
            .map_err(|e| StorageError::Key(format!("Invalid sequence: {}", e)))?;

        Ok(Self { sequence })
    }
}

/// Key mapping a public event id to its sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdKey {
    pub ulid: Ulid,
}

impl EventIdKey {
    pub fn new(ulid: Ulid) -> Self {
        Self { ulid }
    }

    /// Parse a public event id
    pub fn parse(event_id: &str) -> Result<Self, StorageError> {
        let ulid: Ulid = event_id
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid event_id ULID: {}", e)))?;
        Ok(Self { ulid })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("id:{}", self.ulid).into_bytes()
    }
}

/// Encode a sequence as an id-lookup value
pub fn encode_sequence(sequence: u64) -> [u8; 8] {
    sequence.to_be_bytes()
}

/// Decode an id-lookup value
pub fn decode_sequence(bytes: &[u8]) -> Result<u64, StorageError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Key(format!("Sequence value has {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Key for checkpoint entries
/// Format: checkpoint:{job_name}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    /// Job name (e.g., "ingestion")
    pub job_name: String,
}

impl CheckpointKey {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("checkpoint:{}", self.job_name).into_bytes()
    }
}

/// Meta key holding the embedding dimension
pub const META_EMBEDDING_DIMENSION: &[u8] = b"meta:embedding_dimension";
