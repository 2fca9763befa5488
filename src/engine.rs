//! Engine Module
//!
//! Wires the configuration and both stores into the components and routes
//! commands to them.
//!
//! ## Responsibilities
//! - Open the file-backed stores under the data directory
//! - Share one config and one pair of stores across all components
//! - Dispatch `Command`s

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analytics::PerformanceAggregator;
use crate::attachment::AttachmentCoordinator;
use crate::command::{Command, Reply};
use crate::config::Config;
use crate::error::Result;
use crate::records::RecordService;
use crate::store::{BlobStore, DocumentStore, FsBlobStore, MemoryDocumentStore};
use crate::transfer::TransferOrchestrator;

/// The kpivault engine
///
/// Holds no per-request state: every operation re-reads what it needs from
/// the stores, so one engine can serve any number of concurrent callers.
pub struct Engine {
    config: Arc<Config>,
    records: RecordService,
    attachments: AttachmentCoordinator,
    transfers: TransferOrchestrator,
    analytics: PerformanceAggregator,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const RECORDS_FILENAME: &'static str = "records.json";
    const BLOB_DIR: &'static str = "blobs";

    /// Open an engine over the file-backed stores in `config.data_dir`
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Load the document snapshot if present
    /// 3. Open the blob directory
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject unusable settings before creating any directory
        config.validate()?;

        // Step 2: Document store (paths derived from data_dir, not configurable)
        let documents = MemoryDocumentStore::open(&config.data_dir.join(Self::RECORDS_FILENAME))?;

        // Step 3: Blob store
        let blobs = FsBlobStore::open(&config.data_dir.join(Self::BLOB_DIR))?;

        tracing::info!(data_dir = %config.data_dir.display(), "Engine opened");
        Self::with_stores(config, Arc::new(documents), Arc::new(blobs))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Build an engine over caller-supplied stores
    pub fn with_stores(
        config: Config,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            records: RecordService::new(Arc::clone(&config), Arc::clone(&documents)),
            attachments: AttachmentCoordinator::new(
                Arc::clone(&config),
                Arc::clone(&documents),
                blobs,
            ),
            transfers: TransferOrchestrator::new(Arc::clone(&config), Arc::clone(&documents)),
            analytics: PerformanceAggregator::new(Arc::clone(&config), documents),
            config,
        })
    }

    /// Execute a command
    ///
    /// Routes commands to the component that owns them
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        tracing::trace!(command = command.name(), "Executing command");

        match command {
            Command::CreateRecord { record, actor } => {
                self.records.create(record, &actor).await.map(Reply::Record)
            }
            Command::GetRecord { id } => self.records.get(id).await.map(Reply::Record),
            Command::ListRecords => self.records.list().await.map(Reply::Records),
            Command::UpdateRecord { id, update, actor } => {
                self.records.update(id, update, &actor).await.map(Reply::Record)
            }
            Command::DeleteRecord { id, actor } => {
                self.records.soft_delete(id, &actor).await?;
                Ok(Reply::Done)
            }
            Command::Upload(request) => self.attachments.upload(request).await.map(Reply::Attachment),
            Command::Download { file_id } => {
                self.attachments.download(file_id).await.map(Reply::Blob)
            }
            Command::DeleteAttachment {
                record_id,
                file_id,
                actor,
            } => {
                self.attachments.delete(record_id, file_id, &actor).await?;
                Ok(Reply::Done)
            }
            Command::Transfer(request) => {
                self.transfers.transfer(request).await.map(Reply::Transferred)
            }
            Command::PerformanceStats => {
                self.analytics.performance_stats().await.map(Reply::Stats)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn records(&self) -> &RecordService {
        &self.records
    }

    pub fn attachments(&self) -> &AttachmentCoordinator {
        &self.attachments
    }

    pub fn transfers(&self) -> &TransferOrchestrator {
        &self.transfers
    }

    pub fn analytics(&self) -> &PerformanceAggregator {
        &self.analytics
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Where the file-backed blob store keeps its files
    pub fn blob_dir(&self) -> PathBuf {
        self.config.data_dir.join(Self::BLOB_DIR)
    }
}
