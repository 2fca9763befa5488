//! Operation deadlines
//!
//! Every operation gets one deadline when it starts. Each store call made on
//! its behalf is raced against that deadline, so a slow store surfaces as
//! `KpiError::Timeout` instead of a hang.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{KpiError, Result};

/// A fixed point in time by which an operation must finish
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    budget: Duration,
    at: Instant,
}

impl Deadline {
    /// Start the clock for `operation`
    pub fn after(operation: &'static str, budget: Duration) -> Self {
        Self {
            operation,
            budget,
            at: Instant::now() + budget,
        }
    }

    /// Await `fut`, dropping it if the deadline passes first
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.expired()),
        }
    }

    pub fn expired(&self) -> KpiError {
        KpiError::Timeout {
            operation: self.operation,
            after: self.budget,
        }
    }
}
