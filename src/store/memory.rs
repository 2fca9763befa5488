//! In-memory document store
//!
//! Insertion-ordered table behind a single `RwLock`, optionally mirrored to a
//! JSON snapshot file after every committed write.
//!
//! ## Concurrency
//! - Single-document mutations take the write lock for their whole
//!   read-modify-write, so push/pull on one record never lose each other
//! - Every row carries a version bumped on each write; transactions record
//!   the versions they read and refuse to commit if any moved (optimistic
//!   isolation)
//! - No lock is ever held across an `.await`

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{KpiError, Result};
use crate::model::{AttachmentRef, AuditStamp, BlobId, Record, RecordId};

use super::faults::{injected, Triggered};
use super::{DocumentStore, DocumentTransaction, Failpoint, Faults};

#[derive(Debug, Clone)]
struct Row {
    record: Record,
    version: u64,
}

/// Rows plus their insertion order
#[derive(Debug, Clone, Default)]
struct Table {
    order: Vec<RecordId>,
    rows: HashMap<RecordId, Row>,
}

impl Table {
    fn from_records(records: Vec<Record>) -> Self {
        let mut table = Table::default();
        for record in records {
            table.order.push(record.id);
            table.rows.insert(record.id, Row { record, version: 1 });
        }
        table
    }

    fn records(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.rows.get(id)).map(|row| &row.record)
    }

    /// Row selected by the `id AND NOT is_deleted` filter
    fn active_mut(&mut self, id: RecordId) -> Option<&mut Row> {
        self.rows.get_mut(&id).filter(|row| !row.record.is_deleted)
    }

    /// Row selected by `id AND NOT is_deleted AND attachments contains file_id`
    fn holding_mut(&mut self, id: RecordId, file_id: BlobId) -> Option<&mut Row> {
        self.active_mut(id)
            .filter(|row| row.record.find_attachment(file_id).is_some())
    }
}

struct Shared {
    table: RwLock<Table>,
    snapshot_path: Option<PathBuf>,
    faults: Faults,
    open_transactions: AtomicUsize,
}

impl Shared {
    /// Run a mutation under the write lock, persisting the result
    ///
    /// If the snapshot cannot be written the table is restored, so memory and
    /// disk never disagree about a write the caller saw fail.
    fn write<T>(&self, mutate: impl FnOnce(&mut Table) -> Result<T>) -> Result<T> {
        let mut table = self.table.write();
        let before = self.snapshot_path.as_ref().map(|_| table.clone());

        let out = mutate(&mut table)?;

        if let Err(e) = self.persist(&table) {
            if let Some(before) = before {
                *table = before;
            }
            return Err(e);
        }

        Ok(out)
    }

    /// Mirror the table to the snapshot file
    ///
    /// Blocking I/O, called with the write lock held: snapshots must land in
    /// the same order as the writes they capture, and the lock cannot be held
    /// across an `.await`. Stores opened with a snapshot path are meant for a
    /// local CLI data directory; `FsBlobStore` carries the bulk bytes.
    fn persist(&self, table: &Table) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let records: Vec<&Record> = table.records().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;

        // Write-then-rename so a crash never leaves a torn snapshot
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;

        Ok(())
    }

    fn find_active(&self, id: RecordId) -> Result<Record> {
        self.table
            .read()
            .rows
            .get(&id)
            .filter(|row| !row.record.is_deleted)
            .map(|row| row.record.clone())
            .ok_or_else(|| KpiError::record_not_found(id))
    }
}

/// Document store held in memory
#[derive(Clone)]
pub struct MemoryDocumentStore {
    shared: Arc<Shared>,
}

impl MemoryDocumentStore {
    /// Create an empty, purely in-memory store
    pub fn new() -> Self {
        Self::with_table(Table::default(), None)
    }

    /// Open a store mirrored to a JSON snapshot file
    ///
    /// Loads the snapshot if it exists; otherwise starts empty and creates
    /// the file on the first write.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let table = if path.exists() {
            let bytes = fs::read(path)?;
            let records: Vec<Record> = serde_json::from_slice(&bytes)?;
            tracing::debug!(path = %path.display(), records = records.len(), "Loaded document snapshot");
            Table::from_records(records)
        } else {
            Table::default()
        };

        Ok(Self::with_table(table, Some(path.to_path_buf())))
    }

    fn with_table(table: Table, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(table),
                snapshot_path,
                faults: Faults::new(),
                open_transactions: AtomicUsize::new(0),
            }),
        }
    }

    /// Failpoints consulted by this store and its transactions
    pub fn faults(&self) -> &Faults {
        &self.shared.faults
    }

    /// Transactions begun but neither committed, aborted nor dropped
    pub fn open_transactions(&self) -> usize {
        self.shared.open_transactions.load(Ordering::SeqCst)
    }

    /// Total rows, soft-deleted ones included
    pub fn len(&self) -> usize {
        self.shared.table.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a record regardless of its soft-delete flag
    pub fn get_raw(&self, id: RecordId) -> Option<Record> {
        self.shared.table.read().rows.get(&id).map(|row| row.record.clone())
    }

    /// Apply a conditional mutation to one active row
    fn update_active(
        &self,
        id: RecordId,
        stamp: &AuditStamp,
        change: impl FnOnce(&mut Record),
    ) -> Result<u64> {
        self.shared.write(|table| {
            let Some(row) = table.active_mut(id) else {
                return Ok(0);
            };
            change(&mut row.record);
            row.record.touch(stamp);
            row.version += 1;
            Ok(1)
        })
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, record: Record) -> Result<()> {
        self.shared.faults.check(Failpoint::DocInsert).await?;

        self.shared.write(|table| {
            if table.rows.contains_key(&record.id) {
                return Err(KpiError::Store(format!("duplicate record id {}", record.id)));
            }
            table.order.push(record.id);
            table.rows.insert(record.id, Row { record, version: 1 });
            Ok(())
        })
    }

    async fn find_active(&self, id: RecordId) -> Result<Record> {
        self.shared.faults.check(Failpoint::DocFind).await?;
        self.shared.find_active(id)
    }

    async fn list_active(&self) -> Result<Vec<Record>> {
        self.shared.faults.check(Failpoint::DocList).await?;

        let table = self.shared.table.read();
        Ok(table.records().filter(|r| !r.is_deleted).cloned().collect())
    }

    async fn replace_active(&self, record: &Record) -> Result<u64> {
        match self.shared.faults.hit(Failpoint::DocReplace).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::DocReplace)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        self.shared.write(|table| {
            let Some(row) = table.active_mut(record.id) else {
                return Ok(0);
            };
            // Attachments and the delete flag have their own operations
            row.record.goal = record.goal.clone();
            row.record.description = record.description.clone();
            row.record.due_date = record.due_date;
            row.record.actual_percent = record.actual_percent;
            row.record.metadata = record.metadata.clone();
            row.version += 1;
            Ok(1)
        })
    }

    async fn soft_delete(&self, id: RecordId, stamp: &AuditStamp) -> Result<u64> {
        match self.shared.faults.hit(Failpoint::DocSoftDelete).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::DocSoftDelete)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        self.update_active(id, stamp, |record| record.is_deleted = true)
    }

    async fn push_attachment(
        &self,
        id: RecordId,
        attachment: &AttachmentRef,
        stamp: &AuditStamp,
    ) -> Result<u64> {
        match self.shared.faults.hit(Failpoint::DocPush).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::DocPush)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        let attachment = attachment.clone();
        self.update_active(id, stamp, move |record| {
            record.push_attachment(attachment);
        })
    }

    async fn pull_attachment(
        &self,
        id: RecordId,
        file_id: BlobId,
        stamp: &AuditStamp,
    ) -> Result<u64> {
        match self.shared.faults.hit(Failpoint::DocPull).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::DocPull)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        self.shared.write(|table| {
            let Some(row) = table.holding_mut(id, file_id) else {
                return Ok(0);
            };
            row.record.pull_attachment(file_id);
            row.record.touch(stamp);
            row.version += 1;
            Ok(1)
        })
    }

    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>> {
        self.shared.faults.check(Failpoint::TxBegin).await?;

        self.shared.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            read_versions: HashMap::new(),
            staged: HashMap::new(),
            finished: false,
        }))
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Optimistic transaction over a `MemoryDocumentStore`
///
/// Reads go to the live table the first time and to the staged copy after
/// that. Writes only touch the staged copy until commit.
struct MemoryTransaction {
    shared: Arc<Shared>,

    /// Row version observed by the first read of each record
    read_versions: HashMap<RecordId, Option<u64>>,

    /// Working copies of every record written in this transaction
    staged: HashMap<RecordId, Record>,

    finished: bool,
}

impl MemoryTransaction {
    /// Current view of a record inside this transaction
    fn view(&mut self, id: RecordId) -> Option<Record> {
        if let Some(record) = self.staged.get(&id) {
            return Some(record.clone());
        }

        let table = self.shared.table.read();
        let row = table.rows.get(&id);
        self.read_versions
            .entry(id)
            .or_insert_with(|| row.map(|r| r.version));
        row.map(|r| r.record.clone())
    }

    /// Stage a conditional mutation; `change` returns false when its filter
    /// does not select the record
    fn stage_active(
        &mut self,
        id: RecordId,
        stamp: &AuditStamp,
        change: impl FnOnce(&mut Record) -> bool,
    ) -> u64 {
        match self.view(id) {
            Some(mut record) if !record.is_deleted => {
                if !change(&mut record) {
                    return 0;
                }
                record.touch(stamp);
                self.staged.insert(id, record);
                1
            }
            _ => 0,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(KpiError::Store("transaction already finished".to_string()));
        }
        Ok(())
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.open_transactions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl DocumentTransaction for MemoryTransaction {
    async fn find_active(&mut self, id: RecordId) -> Result<Record> {
        self.ensure_open()?;
        self.shared.faults.check(Failpoint::TxFind).await?;

        self.view(id)
            .filter(|record| !record.is_deleted)
            .ok_or_else(|| KpiError::record_not_found(id))
    }

    async fn push_attachment(
        &mut self,
        id: RecordId,
        attachment: &AttachmentRef,
        stamp: &AuditStamp,
    ) -> Result<u64> {
        self.ensure_open()?;
        match self.shared.faults.hit(Failpoint::TxPush).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::TxPush)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        let attachment = attachment.clone();
        Ok(self.stage_active(id, stamp, move |record| {
            record.push_attachment(attachment);
            true
        }))
    }

    async fn pull_attachment(
        &mut self,
        id: RecordId,
        file_id: BlobId,
        stamp: &AuditStamp,
    ) -> Result<u64> {
        self.ensure_open()?;
        match self.shared.faults.hit(Failpoint::TxPull).await {
            Some(Triggered::Fail) => return Err(injected(Failpoint::TxPull)),
            Some(Triggered::NoMatch) => return Ok(0),
            None => {}
        }

        Ok(self.stage_active(id, stamp, |record| record.pull_attachment(file_id)))
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        if let Err(e) = self.shared.faults.check(Failpoint::TxCommit).await {
            self.staged.clear();
            self.finish();
            return Err(e);
        }

        let read_versions = std::mem::take(&mut self.read_versions);
        let staged = std::mem::take(&mut self.staged);
        self.finish();

        self.shared.write(move |table| {
            // Validate every read before applying any write
            for (id, seen) in &read_versions {
                let current = table.rows.get(id).map(|row| row.version);
                if current != *seen {
                    return Err(KpiError::Store(format!(
                        "write conflict on record {}",
                        id
                    )));
                }
            }

            for (id, record) in staged {
                if let Some(row) = table.rows.get_mut(&id) {
                    row.record = record;
                    row.version += 1;
                }
            }

            Ok(())
        })
    }

    async fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;

        self.staged.clear();
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                staged = self.staged.len(),
                "Transaction dropped before commit, discarding staged writes"
            );
            self.finish();
        }
    }
}
