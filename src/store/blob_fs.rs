//! File-backed blob store
//!
//! One file per blob object, named `{id}.blob`.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                       │
//! │   Magic: "KPIB" (4) | Version: u16 (2)                  │
//! │   MetaLen: u32 (4)  | DataLen: u64 (8)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Metadata (MetaLen bytes, bincode)                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data (DataLen bytes)                                    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                        │
//! │   CRC32 over Metadata + Data                            │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{KpiError, Missing, Result};
use crate::model::{Blob, BlobId, BlobMetadata};

use super::BlobStore;

/// Magic bytes identifying a kpivault blob file
const MAGIC: &[u8; 4] = b"KPIB";

/// Current blob format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + MetaLen (4) + DataLen (8)
const HEADER_SIZE: usize = 18;

/// CRC32 (4)
const FOOTER_SIZE: usize = 4;

const EXTENSION: &str = "blob";

/// Blob store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Open or create a blob directory
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, id: BlobId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: Bytes, metadata: BlobMetadata) -> Result<BlobId> {
        let id = BlobId::new();
        let encoded = encode(&metadata, &data)?;

        let path = self.blob_path(id);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(file_id = %id, bytes = data.len(), "Blob written");
        Ok(id)
    }

    async fn get(&self, id: BlobId) -> Result<Blob> {
        let raw = match tokio::fs::read(self.blob_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KpiError::NotFound(Missing::Blob(id)))
            }
            Err(e) => return Err(e.into()),
        };

        let (metadata, data) = decode(Bytes::from(raw))?;
        Ok(Blob { id, metadata, data })
    }

    async fn delete(&self, id: BlobId) -> Result<()> {
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KpiError::NotFound(Missing::Blob(id))),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn encode(metadata: &BlobMetadata, data: &[u8]) -> Result<Vec<u8>> {
    let meta = bincode::serialize(metadata)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&meta);
    hasher.update(data);
    let crc = hasher.finalize();

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + meta.len() + data.len() + FOOTER_SIZE);
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(meta.len() as u32);
    buf.put_u64_le(data.len() as u64);
    buf.put_slice(&meta);
    buf.put_slice(data);
    buf.put_u32_le(crc);

    Ok(buf.to_vec())
}

fn decode(mut raw: Bytes) -> Result<(BlobMetadata, Bytes)> {
    if raw.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupt(format!("file too short ({} bytes)", raw.len())));
    }

    let magic = raw.split_to(4);
    if magic.as_ref() != MAGIC {
        return Err(corrupt(format!("invalid magic {:?}", magic.as_ref())));
    }

    let version = raw.get_u16_le();
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }

    let meta_len = raw.get_u32_le() as usize;
    let data_len = usize::try_from(raw.get_u64_le())
        .map_err(|_| corrupt("data length exceeds address space".to_string()))?;

    // Lengths come straight from disk, so the sum may not fit
    let declared = meta_len
        .checked_add(data_len)
        .and_then(|n| n.checked_add(FOOTER_SIZE))
        .ok_or_else(|| corrupt("declared length overflows".to_string()))?;

    if raw.len() != declared {
        return Err(corrupt(format!(
            "length mismatch: header declares {} bytes, found {}",
            declared,
            raw.len()
        )));
    }

    let meta = raw.split_to(meta_len);
    let data = raw.split_to(data_len);
    let stored_crc = raw.get_u32_le();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&meta);
    hasher.update(&data);
    if hasher.finalize() != stored_crc {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    let metadata: BlobMetadata = bincode::deserialize(&meta)?;
    Ok((metadata, data))
}

fn corrupt(detail: String) -> KpiError {
    KpiError::Store(format!("Corrupt blob file: {}", detail))
}
