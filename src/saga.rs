//! Compensation helper
//!
//! The document store and the blob store cannot commit together. Operations
//! that write to both do it as a sequence of steps, and every step that has
//! taken effect registers a `Compensation` that undoes it if a later step
//! fails.
//!
//! ## Outcomes
//! - Next step succeeds: the compensation is discarded unused
//! - Next step fails, rollback succeeds: the original error is returned and
//!   the stores are consistent again
//! - Next step fails, rollback fails: `KpiError::CompensationFailure`
//!   carrying both errors. The stores are inconsistent and the event is
//!   logged at error level for an operator.
//!
//! The rollback runs on its own budget, so it still gets a chance after the
//! forward step exhausted the operation's deadline.

use std::future::Future;
use std::time::Duration;

use crate::error::{KpiError, Result};

/// The rollback for a step that has already taken effect
pub struct Compensation<U> {
    name: &'static str,
    budget: Duration,
    undo: U,
}

impl<U, F> Compensation<U>
where
    U: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    /// Register `undo` under a name used in log events
    pub fn new(name: &'static str, budget: Duration, undo: U) -> Self {
        Self { name, budget, undo }
    }

    /// Run the next step, rolling back if it fails
    pub async fn protect<T>(self, next: impl Future<Output = Result<T>>) -> Result<T> {
        match next.await {
            Ok(value) => Ok(value),
            Err(cause) => Err(self.compensate(cause).await),
        }
    }

    /// Roll back after `cause`, returning the error the caller should see
    pub async fn compensate(self, cause: KpiError) -> KpiError {
        tracing::warn!(compensation = self.name, error = %cause, "Step failed, compensating");

        let rollback = match tokio::time::timeout(self.budget, (self.undo)()).await {
            Ok(Ok(())) => {
                tracing::info!(compensation = self.name, "Compensation succeeded");
                return cause;
            }
            Ok(Err(e)) => e,
            Err(_) => KpiError::Timeout {
                operation: self.name,
                after: self.budget,
            },
        };

        tracing::error!(
            compensation = self.name,
            error = %cause,
            rollback_error = %rollback,
            "Compensation failed, stores are inconsistent"
        );
        KpiError::compensation(cause, rollback)
    }
}
