//! Performance Aggregator
//!
//! Buckets every active record by completion and reports per-bucket
//! statistics. Read-only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::{log_failure, Result};
use crate::model::Record;
use crate::store::DocumentStore;

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Completion bucket of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionStatus {
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Behind")]
    Behind,
    #[serde(rename = "Not Started")]
    NotStarted,
}

impl CompletionStatus {
    /// Classify a completion percentage (first matching threshold wins)
    pub fn classify(actual_percent: u8) -> Self {
        match actual_percent {
            100.. => CompletionStatus::Completed,
            50.. => CompletionStatus::OnTrack,
            25.. => CompletionStatus::AtRisk,
            1.. => CompletionStatus::Behind,
            0 => CompletionStatus::NotStarted,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompletionStatus::Completed => "Completed",
            CompletionStatus::OnTrack => "On Track",
            CompletionStatus::AtRisk => "At Risk",
            CompletionStatus::Behind => "Behind",
            CompletionStatus::NotStarted => "Not Started",
        }
    }
}

/// Statistics for one non-empty bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceBucket {
    #[serde(rename = "label")]
    pub status: CompletionStatus,
    pub count: usize,
    pub avg_completion: f64,
    pub total_attachments: usize,

    /// Mean of `due_date - now` in days; negative means overdue
    pub avg_days_until_due: f64,
}

#[derive(Debug)]
struct Accumulator {
    status: CompletionStatus,
    count: usize,
    percent_sum: u64,
    attachments: usize,
    days_sum: f64,
}

/// Computes completion statistics over the document store
#[derive(Clone)]
pub struct PerformanceAggregator {
    config: Arc<Config>,
    documents: Arc<dyn DocumentStore>,
}

impl PerformanceAggregator {
    pub fn new(config: Arc<Config>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { config, documents }
    }

    /// Statistics for all active records as of now
    pub async fn performance_stats(&self) -> Result<Vec<PerformanceBucket>> {
        let deadline = Deadline::after("performance_stats", self.config.aggregate_timeout);

        let records = deadline
            .run(self.documents.list_active())
            .await
            .map_err(|e| {
                log_failure("performance_stats", &e);
                e
            })?;

        let buckets = aggregate(&records, Utc::now());
        tracing::debug!(
            records = records.len(),
            buckets = buckets.len(),
            "Performance stats computed"
        );
        Ok(buckets)
    }
}

/// Bucket `records` relative to `now`
///
/// Soft-deleted records are skipped. Buckets come out sorted by count
/// descending; equal counts keep the order in which their first record
/// appeared. Buckets with no records are omitted.
pub fn aggregate(records: &[Record], now: DateTime<Utc>) -> Vec<PerformanceBucket> {
    let mut accumulators: Vec<Accumulator> = Vec::new();

    for record in records.iter().filter(|r| !r.is_deleted) {
        let status = CompletionStatus::classify(record.actual_percent);
        let days = (record.due_date - now).num_milliseconds() as f64 / MILLIS_PER_DAY;

        let index = match accumulators.iter().position(|a| a.status == status) {
            Some(index) => index,
            None => {
                accumulators.push(Accumulator {
                    status,
                    count: 0,
                    percent_sum: 0,
                    attachments: 0,
                    days_sum: 0.0,
                });
                accumulators.len() - 1
            }
        };

        let acc = &mut accumulators[index];
        acc.count += 1;
        acc.percent_sum += u64::from(record.actual_percent);
        acc.attachments += record.attachments.len();
        acc.days_sum += days;
    }

    let mut buckets: Vec<PerformanceBucket> = accumulators
        .into_iter()
        .map(|acc| PerformanceBucket {
            status: acc.status,
            count: acc.count,
            avg_completion: acc.percent_sum as f64 / acc.count as f64,
            total_attachments: acc.attachments,
            avg_days_until_due: acc.days_sum / acc.count as f64,
        })
        .collect();

    // Stable: ties keep first-seen order
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets
}
