//! Record definitions
//!
//! A record is a tracked development goal with a due date, a completion
//! percentage and an ordered list of attachment references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KpiError, Result};
use super::{BlobId, RecordId};

/// Highest accepted completion percentage
pub const MAX_PERCENT: u8 = 100;

/// A tracked development goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub goal: String,
    pub description: String,
    pub due_date: DateTime<Utc>,

    /// Completion, 0–100
    pub actual_percent: u8,

    /// References into the blob store; `file_id` is unique within the list
    pub attachments: Vec<AttachmentRef>,

    /// Soft-delete marker. Once set, the record is invisible to every read
    /// and mutation.
    pub is_deleted: bool,

    pub metadata: Metadata,
}

/// Audit fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record-held pointer to bytes in the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_id: BlobId,
    pub filename: String,
}

/// Who touched a record, and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl AuditStamp {
    pub fn now(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            at: Utc::now(),
        }
    }
}

impl Record {
    /// Build a fresh, active record with no attachments
    pub fn create(new: NewRecord, stamp: &AuditStamp) -> Result<Self> {
        new.validate()?;

        Ok(Self {
            id: RecordId::new(),
            goal: new.goal,
            description: new.description,
            due_date: new.due_date,
            actual_percent: new.actual_percent,
            attachments: Vec::new(),
            is_deleted: false,
            metadata: Metadata {
                created_by: stamp.actor.clone(),
                updated_by: stamp.actor.clone(),
                created_at: stamp.at,
                updated_at: stamp.at,
            },
        })
    }

    /// Linear scan for an attachment by blob id
    pub fn find_attachment(&self, file_id: BlobId) -> Option<&AttachmentRef> {
        self.attachments.iter().find(|a| a.file_id == file_id)
    }

    /// Append a reference unless one with the same `file_id` is present
    ///
    /// Returns true if the list changed.
    pub fn push_attachment(&mut self, attachment: AttachmentRef) -> bool {
        if self.find_attachment(attachment.file_id).is_some() {
            return false;
        }
        self.attachments.push(attachment);
        true
    }

    /// Remove every reference with the given `file_id`
    ///
    /// Returns true if the list changed.
    pub fn pull_attachment(&mut self, file_id: BlobId) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.file_id != file_id);
        self.attachments.len() != before
    }

    /// Update `updated_by` / `updated_at`
    pub fn touch(&mut self, stamp: &AuditStamp) {
        self.metadata.updated_by = stamp.actor.clone();
        self.metadata.updated_at = stamp.at;
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: RecordUpdate, stamp: &AuditStamp) -> Result<()> {
        update.validate()?;

        if !update.goal.is_empty() {
            self.goal = update.goal;
        }
        if !update.description.is_empty() {
            self.description = update.description;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        self.actual_percent = update.actual_percent;
        self.touch(stamp);

        Ok(())
    }
}

/// Fields supplied when creating a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub goal: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub actual_percent: u8,
}

impl NewRecord {
    fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(KpiError::Validation("goal is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(KpiError::Validation("description is required".to_string()));
        }
        validate_percent(self.actual_percent)
    }
}

/// Fields supplied when updating a record
///
/// Empty `goal`/`description` and a missing `due_date` keep the stored value.
/// `actual_percent` is always written: an update that leaves it at its
/// default resets completion to 0. Callers that want to keep the stored
/// percentage must send it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_percent: u8,
}

impl RecordUpdate {
    fn validate(&self) -> Result<()> {
        validate_percent(self.actual_percent)
    }
}

fn validate_percent(percent: u8) -> Result<()> {
    if percent > MAX_PERCENT {
        return Err(KpiError::Validation(format!(
            "actual_percent must be between 0 and {}, got {}",
            MAX_PERCENT, percent
        )));
    }
    Ok(())
}
