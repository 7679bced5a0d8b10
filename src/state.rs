//! Interface to the TSO state engine.
//!
//! The state engine itself lives outside this crate. The lease core only
//! needs one operation from it: resetting the in-memory timestamp state
//! when a replica becomes master, which mints the epoch that names the
//! new mastership term.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use snafu::Snafu;

/// Snapshot of freshly reset TSO state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsoState {
    /// Epoch naming this mastership term. Epochs are minted by the state
    /// engine and must be strictly increasing across resets; decimal,
    /// non-negative, and within the signed 64-bit range.
    pub epoch: u64,
}

/// Failure resetting the TSO state.
#[derive(Debug, Snafu)]
#[snafu(display("state reset failed: {message}"))]
pub struct StateError {
    /// Collaborator-supplied description of the failure.
    pub message: String,
}

/// The TSO state engine, as consumed by the lease core.
#[async_trait]
pub trait StateManager: Send + Sync {
    /// Reinitialise the TSO in-memory state and mint a fresh epoch.
    /// May block for a while; must not be called on a latency-sensitive
    /// task.
    async fn reset(&self) -> Result<TsoState, StateError>;
}

/// State manager stub minting epochs from a counter. For tests and
/// simulation.
pub struct SequenceStateManager {
    next_epoch: AtomicU64,
}

impl SequenceStateManager {
    /// Create a stub whose first reset mints `epoch`.
    pub fn starting_at(epoch: u64) -> Arc<Self> {
        Arc::new(Self {
            next_epoch: AtomicU64::new(epoch),
        })
    }
}

#[async_trait]
impl StateManager for SequenceStateManager {
    async fn reset(&self) -> Result<TsoState, StateError> {
        Ok(TsoState {
            epoch: self.next_epoch.fetch_add(1, Ordering::AcqRel),
        })
    }
}
