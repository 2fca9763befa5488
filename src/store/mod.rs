//! Storage Module
//!
//! The two storage capabilities the coordinators orchestrate, plus reference
//! implementations of each.
//!
//! ## Responsibilities
//! - `DocumentStore`: records by id, soft-delete filtered, with conditional
//!   single-document push/pull on the attachment list and multi-document
//!   transactions
//! - `BlobStore`: put/get/delete of opaque byte objects with metadata
//!
//! The two stores cannot commit together. Keeping them consistent is the job
//! of `crate::attachment` (compensation) and `crate::transfer` (transaction).
//!
//! ## Matched Counts
//! Conditional mutations return the number of documents their filter
//! selected, not the number changed.
//! - push: `id` matches AND not soft-deleted. Pushing a ref that is already
//!   present still matches.
//! - pull: `id` matches AND not soft-deleted AND the list holds `file_id`.
//!   Zero here also covers a ref already pulled by a concurrent writer.

mod faults;
mod memory;
mod blob_memory;
mod blob_fs;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::model::{AttachmentRef, AuditStamp, Blob, BlobId, BlobMetadata, Record, RecordId};

pub use faults::{Fault, Failpoint, Faults};
pub use memory::MemoryDocumentStore;
pub use blob_memory::MemoryBlobStore;
pub use blob_fs::FsBlobStore;

/// Document store capability
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record
    async fn insert(&self, record: Record) -> Result<()>;

    /// Fetch an active record, `NotFound` if absent or soft-deleted
    async fn find_active(&self, id: RecordId) -> Result<Record>;

    /// All active records in store order
    async fn list_active(&self) -> Result<Vec<Record>>;

    /// Overwrite an active record's fields (attachments excluded)
    async fn replace_active(&self, record: &Record) -> Result<u64>;

    /// Flip `is_deleted`, touching audit fields
    async fn soft_delete(&self, id: RecordId, stamp: &AuditStamp) -> Result<u64>;

    /// Conditionally append to the attachment list, touching audit fields
    async fn push_attachment(
        &self,
        id: RecordId,
        attachment: &AttachmentRef,
        stamp: &AuditStamp,
    ) -> Result<u64>;

    /// Conditionally remove from the attachment list, touching audit fields
    async fn pull_attachment(&self, id: RecordId, file_id: BlobId, stamp: &AuditStamp)
        -> Result<u64>;

    /// Start a multi-document transaction
    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>>;
}

/// A multi-document transaction
///
/// Nothing is visible to other readers until `commit`. A failed commit
/// discards every staged write, and so does dropping the handle without
/// committing, so a cancelled caller never leaves a transaction open.
///
/// After `commit` or `abort` the transaction is finished and every further
/// call fails with a store error.
#[async_trait]
pub trait DocumentTransaction: Send {
    async fn find_active(&mut self, id: RecordId) -> Result<Record>;

    async fn push_attachment(
        &mut self,
        id: RecordId,
        attachment: &AttachmentRef,
        stamp: &AuditStamp,
    ) -> Result<u64>;

    async fn pull_attachment(
        &mut self,
        id: RecordId,
        file_id: BlobId,
        stamp: &AuditStamp,
    ) -> Result<u64>;

    /// Make every staged write visible atomically
    async fn commit(&mut self) -> Result<()>;

    /// Discard every staged write
    async fn abort(&mut self) -> Result<()>;
}

/// Blob store capability
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a freshly minted id
    async fn put(&self, data: Bytes, metadata: BlobMetadata) -> Result<BlobId>;

    /// Read a blob back, `NotFound` if absent
    async fn get(&self, id: BlobId) -> Result<Blob>;

    /// Delete a blob, `NotFound` if absent
    async fn delete(&self, id: BlobId) -> Result<()>;
}
