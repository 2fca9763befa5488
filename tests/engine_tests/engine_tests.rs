//! Tests for Engine
//!
//! These tests verify:
//! - Engine lifecycle over the file-backed stores (open/reopen)
//! - Command dispatch for every command
//! - Config validation
//! - Error classification

use std::time::Duration;

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use kpivault::analytics::CompletionStatus;
use kpivault::attachment::UploadRequest;
use kpivault::model::{AttachmentRef, NewRecord, Record, RecordId, RecordUpdate};
use kpivault::transfer::TransferRequest;
use kpivault::{Command, Config, Engine, ErrorKind, KpiError, Reply};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    (temp_dir, engine)
}

async fn create(engine: &Engine, goal: &str, percent: u8) -> Record {
    let reply = engine
        .execute(Command::CreateRecord {
            record: NewRecord {
                goal: goal.to_string(),
                description: "engine fixture".to_string(),
                due_date: Utc::now() + ChronoDuration::days(3),
                actual_percent: percent,
            },
            actor: "alice".to_string(),
        })
        .await
        .unwrap();

    match reply {
        Reply::Record(record) => record,
        other => panic!("unexpected reply: {:?}", other),
    }
}

async fn upload(engine: &Engine, record_id: RecordId, filename: &str, data: &[u8]) -> AttachmentRef {
    let reply = engine
        .execute(Command::Upload(UploadRequest {
            record_id,
            filename: filename.to_string(),
            content_type: "text/plain".to_string(),
            data: Bytes::copy_from_slice(data),
            actor: "alice".to_string(),
        }))
        .await
        .unwrap();

    match reply {
        Reply::Attachment(attachment) => attachment,
        other => panic!("unexpected reply: {:?}", other),
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("vault");

    let engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("blobs").exists());
    assert_eq!(engine.blob_dir(), data_dir.join("blobs"));
    assert_eq!(engine.data_dir(), data_dir.as_path());
}

#[test]
fn test_engine_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("never-created");

    let config = Config::builder()
        .data_dir(&data_dir)
        .transfer_timeout(Duration::ZERO)
        .build();
    let err = Engine::open(config).err().unwrap();

    assert!(matches!(err, KpiError::Config(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!data_dir.exists());

    let config = Config::builder().default_content_type(" ").build();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_engine_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let (kept, moved_to, attachment) = {
        let engine = Engine::open_path(temp_dir.path()).unwrap();
        let a = create(&engine, "A", 10).await;
        let b = create(&engine, "B", 60).await;
        let attachment = upload(&engine, a.id, "notes.txt", b"persisted bytes").await;
        engine
            .execute(Command::Transfer(TransferRequest {
                from: a.id,
                to: b.id,
                file_id: attachment.file_id,
                actor: "alice".to_string(),
            }))
            .await
            .unwrap();
        (a.id, b.id, attachment)
    };

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    let a = engine.records().get(kept).await.unwrap();
    let b = engine.records().get(moved_to).await.unwrap();
    assert!(a.attachments.is_empty());
    assert_eq!(b.attachments, vec![attachment.clone()]);

    let blob = engine.attachments().download(attachment.file_id).await.unwrap();
    assert_eq!(blob.data, Bytes::from_static(b"persisted bytes"));
    assert_eq!(blob.metadata.filename, "notes.txt");
}

// =============================================================================
// Command Dispatch Tests
// =============================================================================

#[tokio::test]
async fn test_execute_full_lifecycle() {
    let (_temp_dir, engine) = setup_temp_engine();
    let record = create(&engine, "Lifecycle", 0).await;

    // Get
    let reply = engine
        .execute(Command::GetRecord { id: record.id })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Record(r) if r.id == record.id));

    // Update
    let reply = engine
        .execute(Command::UpdateRecord {
            id: record.id,
            update: RecordUpdate {
                actual_percent: 100,
                ..Default::default()
            },
            actor: "bob".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Record(r) if r.actual_percent == 100));

    // Upload, download, detach
    let attachment = upload(&engine, record.id, "a.txt", b"abc").await;
    let reply = engine
        .execute(Command::Download {
            file_id: attachment.file_id,
        })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Blob(blob) if blob.data == Bytes::from_static(b"abc")));

    let reply = engine
        .execute(Command::DeleteAttachment {
            record_id: record.id,
            file_id: attachment.file_id,
            actor: "bob".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Done));
    assert!(!engine.blob_dir().join(format!("{}.blob", attachment.file_id)).exists());

    // Stats
    let reply = engine.execute(Command::PerformanceStats).await.unwrap();
    match reply {
        Reply::Stats(buckets) => {
            assert_eq!(buckets.len(), 1);
            assert_eq!(buckets[0].status, CompletionStatus::Completed);
            assert_eq!(buckets[0].total_attachments, 0);
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    // Delete, then list
    let reply = engine
        .execute(Command::DeleteRecord {
            id: record.id,
            actor: "bob".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Done));

    let reply = engine.execute(Command::ListRecords).await.unwrap();
    assert!(matches!(reply, Reply::Records(records) if records.is_empty()));
}

#[tokio::test]
async fn test_execute_propagates_errors() {
    let (_temp_dir, engine) = setup_temp_engine();
    let record = create(&engine, "A", 0).await;

    let err = engine
        .execute(Command::GetRecord { id: RecordId::new() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine
        .execute(Command::Transfer(TransferRequest {
            from: record.id,
            to: record.id,
            file_id: kpivault::model::BlobId::new(),
            actor: "alice".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_command_names() {
    assert_eq!(Command::ListRecords.name(), "list_records");
    assert_eq!(Command::PerformanceStats.name(), "performance_stats");
}

// =============================================================================
// Error Classification Tests
// =============================================================================

#[test]
fn test_error_retryability() {
    let retryable = [
        KpiError::Store("down".to_string()),
        KpiError::TransactionAborted(Box::new(KpiError::Store("conflict".to_string()))),
        KpiError::Timeout {
            operation: "upload",
            after: Duration::from_secs(30),
        },
    ];
    for err in &retryable {
        assert!(err.is_retryable(), "{:?}", err);
    }

    let final_errors = [
        KpiError::Validation("bad".to_string()),
        KpiError::NotFound(kpivault::Missing::Record(RecordId::new())),
        KpiError::CompensationFailure {
            cause: Box::new(KpiError::Store("a".to_string())),
            rollback: Box::new(KpiError::Store("b".to_string())),
        },
    ];
    for err in &final_errors {
        assert!(!err.is_retryable(), "{:?}", err);
    }
}
