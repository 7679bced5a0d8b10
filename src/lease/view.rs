//! Read-only mastership predicate for the serving path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::Snafu;

use crate::clock::Clock;

/// Rejection returned to clients that reached a non-master replica.
/// Retryable: the client should rediscover the master and try again.
#[derive(Debug, Snafu)]
#[snafu(display("not currently master, retry against the current master"))]
pub struct NotMaster;

/// Wait-free view of the lease state.
///
/// Serving threads consult this immediately before emitting any
/// master-authoritative response. A `false` answer must surface to the
/// client as a retryable error, never as a silently-inconsistent reply.
#[derive(Clone)]
pub struct LeaseView {
    end_lease_ms: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl LeaseView {
    pub(crate) fn new(end_lease_ms: Arc<AtomicU64>, clock: Arc<dyn Clock>) -> Self {
        Self { end_lease_ms, clock }
    }

    /// Whether this replica currently holds the lease. A single atomic
    /// load; safe to call concurrently from any thread.
    pub fn in_lease_period(&self) -> bool {
        self.clock.now_millis() <= self.end_lease_ms.load(Ordering::Acquire)
    }

    /// End of the current lease in Unix milliseconds; `0` while not
    /// master.
    pub fn end_lease_ms(&self) -> u64 {
        self.end_lease_ms.load(Ordering::Acquire)
    }

    /// Guard for master-authoritative work.
    pub fn ensure_master(&self) -> Result<(), NotMaster> {
        if self.in_lease_period() { Ok(()) } else { Err(NotMaster) }
    }
}
