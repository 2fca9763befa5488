//! Transfer Orchestrator
//!
//! Moves one attachment reference from one record to another inside a single
//! document-store transaction. The blob is never touched: only the pointer
//! moves, so there is nothing to compensate outside the transaction.
//!
//! ## Abort Paths
//! - A step fails: explicit abort, then the error is returned
//! - Commit fails: the store discards the staged writes, then an explicit
//!   abort releases the handle
//! - A concurrent write to either record between the reads and the commit:
//!   the commit fails with a conflict, and a retry then sees the new state
//! - Deadline passes or the caller drops the future: the transaction handle
//!   is dropped, which discards the staged writes

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::{log_failure, KpiError, Missing, Result};
use crate::model::{AttachmentRef, AuditStamp, BlobId, RecordId};
use crate::store::{DocumentStore, DocumentTransaction};

/// Input for `TransferOrchestrator::transfer`
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: RecordId,
    pub to: RecordId,
    pub file_id: BlobId,
    pub actor: String,
}

/// What a successful transfer moved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub from: RecordId,
    pub to: RecordId,
    pub attachment: AttachmentRef,
    pub transferred_at: DateTime<Utc>,
}

/// Runs cross-record moves as one atomic transaction
#[derive(Clone)]
pub struct TransferOrchestrator {
    config: Arc<Config>,
    documents: Arc<dyn DocumentStore>,
}

impl TransferOrchestrator {
    pub fn new(config: Arc<Config>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { config, documents }
    }

    /// Move `file_id` from record `from` to record `to`
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        // Rejected before any store access
        if request.from == request.to {
            return Err(KpiError::Validation(
                "source and destination record cannot be the same".to_string(),
            ));
        }

        tracing::info!(
            from = %request.from,
            to = %request.to,
            file_id = %request.file_id,
            actor = %request.actor,
            "Transfer started"
        );

        let deadline = Deadline::after("transfer", self.config.transfer_timeout);
        let result = deadline.run(self.run_transaction(&request)).await;

        match &result {
            Ok(receipt) => tracing::info!(
                from = %receipt.from,
                to = %receipt.to,
                file_id = %receipt.attachment.file_id,
                filename = %receipt.attachment.filename,
                "Transfer committed"
            ),
            Err(e) => log_failure("transfer", e),
        }
        result
    }

    async fn run_transaction(&self, request: &TransferRequest) -> Result<TransferReceipt> {
        // Step 1: Begin. Nothing to abort if this fails.
        let mut tx = self.documents.begin().await?;

        let stamp = AuditStamp::now(request.actor.as_str());

        match Self::move_reference(tx.as_mut(), request, &stamp).await {
            Ok(attachment) => {
                // Step 6: Commit. A failed commit has already discarded the
                // staged writes, so the abort only releases the handle and
                // its "already finished" error is expected.
                if let Err(e) = tx.commit().await {
                    if let Err(abort_err) = tx.abort().await {
                        tracing::trace!(error = %abort_err, "Abort after failed commit");
                    }
                    return Err(KpiError::TransactionAborted(Box::new(e)));
                }

                Ok(TransferReceipt {
                    from: request.from,
                    to: request.to,
                    attachment,
                    transferred_at: stamp.at,
                })
            }
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(error = %abort_err, "Transaction abort failed");
                }
                Err(e)
            }
        }
    }

    /// Steps 2–5, all against the open transaction
    async fn move_reference(
        tx: &mut dyn DocumentTransaction,
        request: &TransferRequest,
        stamp: &AuditStamp,
    ) -> Result<AttachmentRef> {
        // Step 2: Both records must exist and be active
        let source = tx.find_active(request.from).await.map_err(aborted_unless_missing)?;
        tx.find_active(request.to).await.map_err(aborted_unless_missing)?;

        // Step 3: The source must hold the reference
        let attachment = source
            .find_attachment(request.file_id)
            .cloned()
            .ok_or(KpiError::NotFound(Missing::Attachment {
                record: request.from,
                file: request.file_id,
            }))?;

        // Step 4: Remove from source
        let matched = tx
            .pull_attachment(request.from, request.file_id, stamp)
            .await
            .map_err(|e| KpiError::TransactionAborted(Box::new(e)))?;
        if matched == 0 {
            return Err(KpiError::TransactionAborted(Box::new(KpiError::NotFound(
                Missing::Attachment {
                    record: request.from,
                    file: request.file_id,
                },
            ))));
        }

        // Step 5: Add to destination
        let matched = tx
            .push_attachment(request.to, &attachment, stamp)
            .await
            .map_err(|e| KpiError::TransactionAborted(Box::new(e)))?;
        if matched == 0 {
            return Err(KpiError::TransactionAborted(Box::new(
                KpiError::record_not_found(request.to),
            )));
        }

        tracing::debug!(
            from = %request.from,
            to = %request.to,
            file_id = %request.file_id,
            "Reference staged on destination"
        );
        Ok(attachment)
    }
}

fn aborted_unless_missing(e: KpiError) -> KpiError {
    match e {
        KpiError::NotFound(_) => e,
        other => KpiError::TransactionAborted(Box::new(other)),
    }
}
