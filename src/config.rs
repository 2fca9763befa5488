//! Configuration for kpivault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KpiError, Result};

/// Main configuration for a kpivault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the file-backed stores
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── records.json     (document snapshot)
    ///     └── blobs/           (one file per blob object)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Timeout Configuration
    // -------------------------------------------------------------------------
    /// Deadline for upload and delete of a single attachment
    pub attachment_timeout: Duration,

    /// Deadline for the cross-record transfer transaction
    pub transfer_timeout: Duration,

    /// Deadline for plain reads (get, list, download) and record writes
    pub read_timeout: Duration,

    /// Deadline for the performance aggregation
    pub aggregate_timeout: Duration,

    /// Budget for a rollback step, counted from the moment it starts
    pub compensation_timeout: Duration,

    // -------------------------------------------------------------------------
    // Attachment Configuration
    // -------------------------------------------------------------------------
    /// Largest accepted attachment payload (in bytes)
    pub max_attachment_bytes: usize,

    /// Content type recorded when the caller supplies none
    pub default_content_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./kpivault_data"),
            attachment_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(10),
            aggregate_timeout: Duration::from_secs(15),
            compensation_timeout: Duration::from_secs(10),
            max_attachment_bytes: 10 * 1024 * 1024, // 10 MB
            default_content_type: "application/octet-stream".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values that would make every operation fail
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("attachment_timeout", self.attachment_timeout),
            ("transfer_timeout", self.transfer_timeout),
            ("read_timeout", self.read_timeout),
            ("aggregate_timeout", self.aggregate_timeout),
            ("compensation_timeout", self.compensation_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(KpiError::Config(format!("{} must be non-zero", name)));
            }
        }

        if self.max_attachment_bytes == 0 {
            return Err(KpiError::Config(
                "max_attachment_bytes must be non-zero".to_string(),
            ));
        }

        if self.default_content_type.trim().is_empty() {
            return Err(KpiError::Config(
                "default_content_type must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for the file-backed stores)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the upload/delete deadline
    pub fn attachment_timeout(mut self, timeout: Duration) -> Self {
        self.config.attachment_timeout = timeout;
        self
    }

    /// Set the transfer transaction deadline
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    /// Set the read deadline
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the aggregation deadline
    pub fn aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.config.aggregate_timeout = timeout;
        self
    }

    /// Set the rollback budget
    pub fn compensation_timeout(mut self, timeout: Duration) -> Self {
        self.config.compensation_timeout = timeout;
        self
    }

    /// Set the maximum attachment size (in bytes)
    pub fn max_attachment_bytes(mut self, size: usize) -> Self {
        self.config.max_attachment_bytes = size;
        self
    }

    /// Set the fallback content type
    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.default_content_type = content_type.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
