//! Fault injection
//!
//! Armable failpoints for the in-memory stores, used to drive the
//! compensation and abort paths deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{KpiError, Result};

/// Places where a store consults its faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failpoint {
    DocInsert,
    DocFind,
    DocList,
    DocReplace,
    DocSoftDelete,
    DocPush,
    DocPull,
    TxBegin,
    TxFind,
    TxPush,
    TxPull,
    TxCommit,
    BlobPut,
    BlobGet,
    BlobDelete,
}

/// What an armed failpoint does when hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Return a store error
    Fail,

    /// Report zero matched documents (conditional mutations only)
    NoMatch,

    /// Sleep before continuing normally
    Delay(Duration),
}

/// Triggered fault after any delay has been served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Triggered {
    Fail,
    NoMatch,
}

#[derive(Debug)]
struct Armed {
    fault: Fault,
    remaining: usize,
}

/// Shared set of armed failpoints
///
/// Cloning shares the same set, so a test can keep a handle after moving a
/// store into an `Arc<dyn ...>`.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    armed: Arc<Mutex<HashMap<Failpoint, Armed>>>,
    hits: Arc<Mutex<HashMap<Failpoint, usize>>>,
}

impl Faults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a failpoint for the next hit
    pub fn arm(&self, point: Failpoint, fault: Fault) {
        self.arm_times(point, fault, 1);
    }

    /// Arm a failpoint for the next `times` hits
    pub fn arm_times(&self, point: Failpoint, fault: Fault, times: usize) {
        self.armed.lock().insert(
            point,
            Armed {
                fault,
                remaining: times,
            },
        );
    }

    pub fn clear(&self) {
        self.armed.lock().clear();
        self.hits.lock().clear();
    }

    /// How many times a failpoint has been reached, armed or not
    pub fn hits(&self, point: Failpoint) -> usize {
        self.hits.lock().get(&point).copied().unwrap_or(0)
    }

    /// Consult a failpoint, serving any armed delay
    pub(crate) async fn hit(&self, point: Failpoint) -> Option<Triggered> {
        *self.hits.lock().entry(point).or_insert(0) += 1;

        let fault = {
            let mut armed = self.armed.lock();
            let fault = match armed.get_mut(&point) {
                Some(entry) => {
                    entry.remaining = entry.remaining.saturating_sub(1);
                    entry.fault
                }
                None => return None,
            };
            if armed.get(&point).map(|e| e.remaining == 0).unwrap_or(false) {
                armed.remove(&point);
            }
            fault
        };

        match fault {
            Fault::Fail => Some(Triggered::Fail),
            Fault::NoMatch => Some(Triggered::NoMatch),
            Fault::Delay(duration) => {
                tracing::trace!(?point, ?duration, "Injected delay");
                tokio::time::sleep(duration).await;
                None
            }
        }
    }

    /// Consult a failpoint guarding a plain operation
    pub(crate) async fn check(&self, point: Failpoint) -> Result<()> {
        match self.hit(point).await {
            Some(_) => Err(injected(point)),
            None => Ok(()),
        }
    }
}

pub(crate) fn injected(point: Failpoint) -> KpiError {
    KpiError::Store(format!("injected failure at {:?}", point))
}
