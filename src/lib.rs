//! # kpivault
//!
//! Development-record ("KPI") tracking with file attachments, where the
//! records live in a document store and the attachment bytes live in a
//! separate blob store:
//! - Upload and delete keep both stores consistent with compensating steps
//! - Cross-record transfer runs as one document-store transaction
//! - Performance statistics bucket records by completion
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │                  (Command → component)                       │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!      ┌──────────────┬─────────┴────┬──────────────┐
//!      ▼              ▼              ▼              ▼
//! ┌─────────┐   ┌────────────┐ ┌───────────┐ ┌────────────┐
//! │ Records │   │ Attachment │ │ Transfer  │ │ Analytics  │
//! │ (CRUD)  │   │  (saga)    │ │  (txn)    │ │  (read)    │
//! └────┬────┘   └──┬──────┬──┘ └─────┬─────┘ └─────┬──────┘
//!      │           │      │          │             │
//!      ▼           ▼      │          ▼             ▼
//! ┌───────────────────────┼──────────────────────────────────┐
//! │                  DocumentStore                            │
//! └───────────────────────┼──────────────────────────────────┘
//!                         ▼
//!                ┌─────────────────┐
//!                │    BlobStore    │
//!                └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod model;
pub mod store;
pub mod deadline;
pub mod saga;

pub mod records;
pub mod attachment;
pub mod transfer;
pub mod analytics;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, KpiError, Missing, Result};
pub use config::Config;
pub use engine::Engine;
pub use command::{Command, Reply};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kpivault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
