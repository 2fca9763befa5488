//! Model Module
//!
//! Data types shared by the stores and the coordinators.
//!
//! ## Ownership
//! - `Record` lives in the document store and is re-read on every call
//! - `AttachmentRef` is a pointer held by a record, not an owner
//! - `Blob` lives in the blob store; only the coordinators create or delete it

mod id;
mod record;
mod blob;

pub use id::{BlobId, RecordId};
pub use record::{AttachmentRef, AuditStamp, Metadata, NewRecord, Record, RecordUpdate, MAX_PERCENT};
pub use blob::{Blob, BlobMetadata};
