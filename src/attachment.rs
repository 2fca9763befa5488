//! Attachment Coordinator
//!
//! Upload, download and delete of a single attachment. Upload and delete
//! write to both stores, so each registers a `Compensation` for the first
//! write before attempting the second.
//!
//! ## Step Order
//! - Upload: blob first, then the reference. A failed reference push deletes
//!   the blob again.
//! - Delete: reference first, then the blob. A failed blob delete restores
//!   the reference. A crash between the two steps leaves an unreachable blob,
//!   never a reference to missing bytes.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::{log_failure, KpiError, Missing, Result};
use crate::model::{AttachmentRef, AuditStamp, Blob, BlobId, BlobMetadata, RecordId};
use crate::saga::Compensation;
use crate::store::{BlobStore, DocumentStore};

/// Input for `AttachmentCoordinator::upload`
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub record_id: RecordId,
    pub filename: String,

    /// Empty means "unknown"; the configured default is recorded instead
    pub content_type: String,

    pub data: Bytes,
    pub actor: String,
}

/// Keeps record attachment lists and blob objects consistent
#[derive(Clone)]
pub struct AttachmentCoordinator {
    config: Arc<Config>,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl AttachmentCoordinator {
    pub fn new(
        config: Arc<Config>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            documents,
            blobs,
        }
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Store a file and attach it to an active record
    ///
    /// Steps:
    /// 1. Validate the request (no store access)
    /// 2. Fetch the record (NotFound if absent or soft-deleted)
    /// 3. Put the bytes into the blob store
    /// 4. Push the reference; on failure delete the blob
    pub async fn upload(&self, request: UploadRequest) -> Result<AttachmentRef> {
        tracing::info!(
            record_id = %request.record_id,
            filename = %request.filename,
            bytes = request.data.len(),
            actor = %request.actor,
            "Upload started"
        );

        let record_id = request.record_id;
        let result = self.upload_steps(request).await;

        match &result {
            Ok(attachment) => tracing::info!(
                record_id = %record_id,
                file_id = %attachment.file_id,
                "Upload succeeded"
            ),
            Err(e) => log_failure("upload", e),
        }
        result
    }

    async fn upload_steps(&self, request: UploadRequest) -> Result<AttachmentRef> {
        let UploadRequest {
            record_id,
            filename,
            content_type,
            data,
            actor,
        } = request;

        // Step 1: Reject bad input before touching either store
        self.validate_upload(&filename, &data)?;
        let content_type = if content_type.trim().is_empty() {
            self.config.default_content_type.clone()
        } else {
            content_type
        };

        let deadline = Deadline::after("upload", self.config.attachment_timeout);

        // Step 2: The record must exist and be active
        deadline.run(self.documents.find_active(record_id)).await?;

        // Step 3: Store the bytes. Nothing to undo if this fails.
        let metadata = BlobMetadata {
            filename: filename.clone(),
            uploaded_by: actor.clone(),
            uploaded_at: Utc::now(),
            content_type,
        };
        let file_id = deadline.run(self.blobs.put(data, metadata)).await?;
        tracing::debug!(record_id = %record_id, file_id = %file_id, "Blob stored");

        // Step 4: Attach, deleting the blob again if the record is gone
        let attachment = AttachmentRef { file_id, filename };
        let stamp = AuditStamp::now(actor);

        let blobs = Arc::clone(&self.blobs);
        let undo = Compensation::new(
            "delete_uploaded_blob",
            self.config.compensation_timeout,
            move || async move { blobs.delete(file_id).await },
        );

        undo.protect(async {
            let matched = deadline
                .run(self.documents.push_attachment(record_id, &attachment, &stamp))
                .await?;
            if matched == 0 {
                return Err(KpiError::record_not_found(record_id));
            }
            Ok(())
        })
        .await?;

        Ok(attachment)
    }

    fn validate_upload(&self, filename: &str, data: &Bytes) -> Result<()> {
        if filename.trim().is_empty() {
            return Err(KpiError::Validation("filename is required".to_string()));
        }
        if data.len() > self.config.max_attachment_bytes {
            return Err(KpiError::Validation(format!(
                "file size too large ({} bytes, max {})",
                data.len(),
                self.config.max_attachment_bytes
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Download
    // =========================================================================

    /// Read an attachment's bytes and metadata back
    pub async fn download(&self, file_id: BlobId) -> Result<Blob> {
        let deadline = Deadline::after("download", self.config.read_timeout);

        let mut blob = deadline.run(self.blobs.get(file_id)).await.map_err(|e| {
            log_failure("download", &e);
            e
        })?;

        if blob.metadata.content_type.trim().is_empty() {
            blob.metadata.content_type = self.config.default_content_type.clone();
        }

        tracing::debug!(file_id = %file_id, bytes = blob.len(), "Download served");
        Ok(blob)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Detach a file from a record and delete its bytes
    ///
    /// Steps:
    /// 1. Fetch the record (NotFound if absent or soft-deleted)
    /// 2. Find the reference (NotFound if the record does not hold it)
    /// 3. Pull the reference (NotFound if a concurrent operation got there first)
    /// 4. Delete the blob; on failure push the reference back
    pub async fn delete(&self, record_id: RecordId, file_id: BlobId, actor: &str) -> Result<()> {
        tracing::info!(
            record_id = %record_id,
            file_id = %file_id,
            actor = %actor,
            "Attachment delete started"
        );

        let result = self.delete_steps(record_id, file_id, actor).await;

        match &result {
            Ok(()) => tracing::info!(
                record_id = %record_id,
                file_id = %file_id,
                "Attachment delete succeeded"
            ),
            Err(e) => log_failure("delete_attachment", e),
        }
        result
    }

    async fn delete_steps(&self, record_id: RecordId, file_id: BlobId, actor: &str) -> Result<()> {
        let deadline = Deadline::after("delete_attachment", self.config.attachment_timeout);

        // Step 1: The record must exist and be active
        let record = deadline.run(self.documents.find_active(record_id)).await?;

        // Step 2: Keep the filename around in case the reference comes back
        let attachment = record
            .find_attachment(file_id)
            .cloned()
            .ok_or(KpiError::NotFound(Missing::Attachment {
                record: record_id,
                file: file_id,
            }))?;

        // Step 3: Detach first, so the bytes are never referenced while missing.
        // Zero matched means a concurrent delete or transfer took the ref
        // after step 2; the blob now belongs to that operation.
        let stamp = AuditStamp::now(actor);
        let matched = deadline
            .run(self.documents.pull_attachment(record_id, file_id, &stamp))
            .await?;
        if matched == 0 {
            return Err(KpiError::NotFound(Missing::Attachment {
                record: record_id,
                file: file_id,
            }));
        }
        tracing::debug!(record_id = %record_id, file_id = %file_id, "Reference removed");

        // Step 4: Delete the bytes, restoring the reference if that fails
        let documents = Arc::clone(&self.documents);
        let undo = Compensation::new(
            "restore_attachment_ref",
            self.config.compensation_timeout,
            move || async move {
                let matched = documents
                    .push_attachment(record_id, &attachment, &stamp)
                    .await?;
                if matched == 0 {
                    return Err(KpiError::record_not_found(record_id));
                }
                Ok(())
            },
        );

        undo.protect(async {
            match deadline.run(self.blobs.delete(file_id)).await {
                // Bytes already gone: the reference removal was all that was left
                Err(KpiError::NotFound(Missing::Blob(_))) => {
                    tracing::warn!(file_id = %file_id, "Blob was already missing");
                    Ok(())
                }
                other => other,
            }
        })
        .await
    }
}
