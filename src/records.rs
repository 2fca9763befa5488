//! Record Service
//!
//! Plain CRUD over records. Attachments are never written here; they belong
//! to `crate::attachment` and `crate::transfer`.

use std::sync::Arc;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::{log_failure, KpiError, Result};
use crate::model::{AuditStamp, NewRecord, Record, RecordId, RecordUpdate};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct RecordService {
    config: Arc<Config>,
    documents: Arc<dyn DocumentStore>,
}

impl RecordService {
    pub fn new(config: Arc<Config>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { config, documents }
    }

    fn deadline(&self, operation: &'static str) -> Deadline {
        Deadline::after(operation, self.config.read_timeout)
    }

    /// Create an active record with no attachments
    pub async fn create(&self, new: NewRecord, actor: &str) -> Result<Record> {
        let record = Record::create(new, &AuditStamp::now(actor))?;

        self.deadline("create_record")
            .run(self.documents.insert(record.clone()))
            .await
            .map_err(|e| {
                log_failure("create_record", &e);
                e
            })?;

        tracing::info!(record_id = %record.id, actor = %actor, "Record created");
        Ok(record)
    }

    /// Fetch one active record
    pub async fn get(&self, id: RecordId) -> Result<Record> {
        self.deadline("get_record")
            .run(self.documents.find_active(id))
            .await
    }

    /// All active records in store order
    pub async fn list(&self) -> Result<Vec<Record>> {
        self.deadline("list_records")
            .run(self.documents.list_active())
            .await
    }

    /// Apply a partial update (see `RecordUpdate` for which fields are kept)
    pub async fn update(&self, id: RecordId, update: RecordUpdate, actor: &str) -> Result<Record> {
        let deadline = self.deadline("update_record");

        let result = async {
            let mut record = deadline.run(self.documents.find_active(id)).await?;
            record.apply(update, &AuditStamp::now(actor))?;

            let matched = deadline.run(self.documents.replace_active(&record)).await?;
            if matched == 0 {
                return Err(KpiError::record_not_found(id));
            }
            Ok(record)
        }
        .await;

        match &result {
            Ok(_) => tracing::info!(record_id = %id, actor = %actor, "Record updated"),
            Err(e) => log_failure("update_record", e),
        }
        result
    }

    /// Mark a record deleted. There is no way back.
    pub async fn soft_delete(&self, id: RecordId, actor: &str) -> Result<()> {
        let matched = self
            .deadline("delete_record")
            .run(self.documents.soft_delete(id, &AuditStamp::now(actor)))
            .await?;

        if matched == 0 {
            let e = KpiError::record_not_found(id);
            log_failure("delete_record", &e);
            return Err(e);
        }

        tracing::info!(record_id = %id, actor = %actor, "Record soft-deleted");
        Ok(())
    }
}
