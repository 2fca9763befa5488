//! Command definitions
//!
//! Tagged requests and replies for `Engine::execute`. A transport layer
//! builds a `Command`, and matches on the `Reply` or on `KpiError::kind()`.

use crate::analytics::PerformanceBucket;
use crate::attachment::UploadRequest;
use crate::model::{AttachmentRef, Blob, BlobId, NewRecord, Record, RecordId, RecordUpdate};
use crate::transfer::{TransferReceipt, TransferRequest};

/// A request to the engine
#[derive(Debug, Clone)]
pub enum Command {
    CreateRecord { record: NewRecord, actor: String },
    GetRecord { id: RecordId },
    ListRecords,
    UpdateRecord { id: RecordId, update: RecordUpdate, actor: String },
    DeleteRecord { id: RecordId, actor: String },

    Upload(UploadRequest),
    Download { file_id: BlobId },
    DeleteAttachment { record_id: RecordId, file_id: BlobId, actor: String },
    Transfer(TransferRequest),

    PerformanceStats,
}

impl Command {
    /// Stable operation name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateRecord { .. } => "create_record",
            Command::GetRecord { .. } => "get_record",
            Command::ListRecords => "list_records",
            Command::UpdateRecord { .. } => "update_record",
            Command::DeleteRecord { .. } => "delete_record",
            Command::Upload(_) => "upload",
            Command::Download { .. } => "download",
            Command::DeleteAttachment { .. } => "delete_attachment",
            Command::Transfer(_) => "transfer",
            Command::PerformanceStats => "performance_stats",
        }
    }
}

/// A successful result from the engine
#[derive(Debug, Clone)]
pub enum Reply {
    Record(Record),
    Records(Vec<Record>),
    Attachment(AttachmentRef),
    Blob(Blob),
    Transferred(TransferReceipt),
    Stats(Vec<PerformanceBucket>),

    /// The command succeeded and has nothing to return
    Done,
}
