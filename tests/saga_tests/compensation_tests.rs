//! Tests for Compensation and Deadline
//!
//! These tests verify:
//! - The rollback only runs when the protected step fails
//! - A successful rollback returns the original error
//! - A failed or slow rollback yields CompensationFailure
//! - Deadlines turn slow futures into Timeout errors

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kpivault::deadline::Deadline;
use kpivault::saga::Compensation;
use kpivault::{ErrorKind, KpiError, Result};

// =============================================================================
// Helper Functions
// =============================================================================

/// A rollback that counts its runs, failing when `fail` is set
fn counting_undo(
    runs: &Arc<AtomicUsize>,
    fail: bool,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
    let runs = Arc::clone(runs);
    move || {
        Box::pin(async move {
            runs.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(KpiError::Store("rollback refused".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

// =============================================================================
// Compensation Tests
// =============================================================================

#[tokio::test]
async fn test_successful_step_skips_rollback() {
    let runs = Arc::new(AtomicUsize::new(0));
    let undo = Compensation::new("test_undo", Duration::from_secs(1), counting_undo(&runs, false));

    let value = undo.protect(async { Ok::<_, KpiError>(42) }).await.unwrap();

    assert_eq!(value, 42);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_step_returns_original_error_after_rollback() {
    let runs = Arc::new(AtomicUsize::new(0));
    let undo = Compensation::new("test_undo", Duration::from_secs(1), counting_undo(&runs, false));

    let err = undo
        .protect(async { Err::<(), _>(KpiError::Validation("step refused".to_string())) })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_rollback_carries_both_errors() {
    let runs = Arc::new(AtomicUsize::new(0));
    let undo = Compensation::new("test_undo", Duration::from_secs(1), counting_undo(&runs, true));

    let err = undo
        .protect(async { Err::<(), _>(KpiError::Store("step broke".to_string())) })
        .await
        .unwrap_err();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    match err {
        KpiError::CompensationFailure { cause, rollback } => {
            assert!(cause.to_string().contains("step broke"));
            assert!(rollback.to_string().contains("rollback refused"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_rollback_times_out() {
    let undo = Compensation::new("slow_undo", Duration::from_secs(2), || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });

    let err = undo
        .compensate(KpiError::Store("step broke".to_string()))
        .await;

    match err {
        KpiError::CompensationFailure { rollback, .. } => {
            assert_eq!(rollback.kind(), ErrorKind::Timeout);
            assert!(rollback.to_string().contains("slow_undo"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// =============================================================================
// Deadline Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_expires_slow_future() {
    let deadline = Deadline::after("slow_op", Duration::from_secs(1));

    let err = deadline
        .run(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        KpiError::Timeout { operation: "slow_op", after } if after == Duration::from_secs(1)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_is_shared_across_steps() {
    let deadline = Deadline::after("two_steps", Duration::from_secs(3));

    deadline
        .run(async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        })
        .await
        .unwrap();

    // Only one second of the budget is left for the second step
    let err = deadline
        .run(async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}
