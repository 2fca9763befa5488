//! Blob definitions
//!
//! The bytes of an attachment plus the metadata recorded at upload time.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BlobId;

/// Metadata stored alongside a blob object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Original filename, used for downloads
    pub filename: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub content_type: String,
}

/// A blob object read back from the blob store
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub id: BlobId,
    pub metadata: BlobMetadata,
    pub data: Bytes,
}

impl Blob {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
