//! Tests for PerformanceAggregator
//!
//! These tests verify:
//! - Threshold classification at every boundary
//! - Per-bucket counts, averages and attachment totals
//! - Bucket ordering (count descending, ties in first-seen order)
//! - Soft-deleted records are excluded

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use kpivault::analytics::{aggregate, CompletionStatus, PerformanceBucket};
use kpivault::model::{AttachmentRef, AuditStamp, BlobId, NewRecord, Record};
use kpivault::store::{DocumentStore, Failpoint, Fault, MemoryBlobStore, MemoryDocumentStore};
use kpivault::{Config, Engine, ErrorKind};

// =============================================================================
// Helper Functions
// =============================================================================

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn make_record(percent: u8, due_in_days: i64, attachments: usize) -> Record {
    let mut record = Record::create(
        NewRecord {
            goal: format!("goal at {}%", percent),
            description: "aggregation fixture".to_string(),
            due_date: fixed_now() + ChronoDuration::days(due_in_days),
            actual_percent: percent,
        },
        &AuditStamp::now("alice"),
    )
    .unwrap();

    for i in 0..attachments {
        record.push_attachment(AttachmentRef {
            file_id: BlobId::new(),
            filename: format!("file-{}.txt", i),
        });
    }
    record
}

fn bucket<'a>(buckets: &'a [PerformanceBucket], status: CompletionStatus) -> &'a PerformanceBucket {
    buckets
        .iter()
        .find(|b| b.status == status)
        .unwrap_or_else(|| panic!("no {} bucket", status.label()))
}

fn setup_engine() -> (MemoryDocumentStore, Engine) {
    let documents = MemoryDocumentStore::new();
    let engine = Engine::with_stores(
        Config::default(),
        Arc::new(documents.clone()),
        Arc::new(MemoryBlobStore::new()),
    )
    .unwrap();
    (documents, engine)
}

// =============================================================================
// Classification Tests
// =============================================================================

#[test]
fn test_classify_boundaries() {
    let cases = [
        (0, CompletionStatus::NotStarted),
        (1, CompletionStatus::Behind),
        (24, CompletionStatus::Behind),
        (25, CompletionStatus::AtRisk),
        (49, CompletionStatus::AtRisk),
        (50, CompletionStatus::OnTrack),
        (99, CompletionStatus::OnTrack),
        (100, CompletionStatus::Completed),
    ];

    for (percent, expected) in cases {
        assert_eq!(
            CompletionStatus::classify(percent),
            expected,
            "percent {}",
            percent
        );
    }
}

#[test]
fn test_status_labels_serialize_as_display_names() {
    assert_eq!(CompletionStatus::OnTrack.label(), "On Track");
    assert_eq!(
        serde_json::to_string(&CompletionStatus::NotStarted).unwrap(),
        "\"Not Started\""
    );

    let buckets = aggregate(&[make_record(30, 1, 0)], fixed_now());
    let json = serde_json::to_value(&buckets).unwrap();
    assert_eq!(json[0]["label"], "At Risk");
    assert_eq!(json[0]["count"], 1);
}

// =============================================================================
// Aggregation Tests
// =============================================================================

#[test]
fn test_aggregate_two_not_started_one_completed() {
    let records = vec![
        make_record(0, 10, 1),
        make_record(0, 20, 2),
        make_record(100, -5, 0),
    ];

    let buckets = aggregate(&records, fixed_now());

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].status, CompletionStatus::NotStarted);
    assert_eq!(buckets[0].count, 2);
    assert_eq!(buckets[0].avg_completion, 0.0);
    assert_eq!(buckets[0].total_attachments, 3);
    assert_eq!(buckets[0].avg_days_until_due, 15.0);

    assert_eq!(buckets[1].status, CompletionStatus::Completed);
    assert_eq!(buckets[1].count, 1);
    assert_eq!(buckets[1].avg_completion, 100.0);
    assert_eq!(buckets[1].avg_days_until_due, -5.0);
}

#[test]
fn test_aggregate_averages_within_bucket() {
    let records = vec![make_record(60, 2, 0), make_record(90, -4, 3)];

    let buckets = aggregate(&records, fixed_now());
    let on_track = bucket(&buckets, CompletionStatus::OnTrack);

    assert_eq!(on_track.count, 2);
    assert_eq!(on_track.avg_completion, 75.0);
    assert_eq!(on_track.total_attachments, 3);
    assert_eq!(on_track.avg_days_until_due, -1.0);
}

#[test]
fn test_aggregate_fractional_days() {
    let mut record = make_record(10, 0, 0);
    record.due_date = fixed_now() + ChronoDuration::hours(36);

    let buckets = aggregate(&[record], fixed_now());

    assert_eq!(buckets[0].avg_days_until_due, 1.5);
}

#[test]
fn test_aggregate_ties_keep_first_seen_order() {
    let records = vec![
        make_record(30, 1, 0),
        make_record(100, 1, 0),
        make_record(5, 1, 0),
        make_record(5, 1, 0),
    ];

    let buckets = aggregate(&records, fixed_now());
    let order: Vec<CompletionStatus> = buckets.iter().map(|b| b.status).collect();

    assert_eq!(
        order,
        vec![
            CompletionStatus::Behind,
            CompletionStatus::AtRisk,
            CompletionStatus::Completed,
        ]
    );
}

#[test]
fn test_aggregate_skips_soft_deleted_and_empty_buckets() {
    let mut deleted = make_record(100, 1, 4);
    deleted.is_deleted = true;
    let records = vec![deleted, make_record(50, 1, 0)];

    let buckets = aggregate(&records, fixed_now());

    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].status, CompletionStatus::OnTrack);
    assert_eq!(buckets[0].total_attachments, 0);
}

#[test]
fn test_aggregate_empty_input() {
    assert!(aggregate(&[], fixed_now()).is_empty());
}

// =============================================================================
// Store-backed Tests
// =============================================================================

#[tokio::test]
async fn test_performance_stats_reads_active_records() {
    let (documents, engine) = setup_engine();
    for percent in [0, 0, 100] {
        documents.insert(make_record(percent, 3, 0)).await.unwrap();
    }
    let deleted = make_record(40, 3, 0);
    let deleted_id = deleted.id;
    documents.insert(deleted).await.unwrap();
    engine.records().soft_delete(deleted_id, "bob").await.unwrap();

    let buckets = engine.analytics().performance_stats().await.unwrap();

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].status, CompletionStatus::NotStarted);
    assert_eq!(buckets[0].count, 2);
    assert_eq!(buckets[1].status, CompletionStatus::Completed);
    assert_eq!(buckets[1].count, 1);
}

#[tokio::test]
async fn test_performance_stats_propagates_store_failure() {
    let (documents, engine) = setup_engine();
    documents.faults().arm(Failpoint::DocList, Fault::Fail);

    let err = engine.analytics().performance_stats().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
}
