//! Gateway to the coordination service.
//!
//! The coordination service is a linearisable, versioned, hierarchical
//! key/value store. This module exposes the three operations the lease
//! core needs: idempotent path creation, versioned reads, and
//! compare-and-swap writes whose pre-condition is the version observed
//! earlier. Outcomes are tagged so callers branch on semantics
//! (mismatch vs. transport failure) rather than on error downcasts.
//!
//! The gateway never retries. Retry policy belongs to the lease
//! controller, which knows which failures are benign.

mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use snafu::Snafu;

pub use memory::MemoryCoordinationStore;

/// A value read from the coordination service together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Raw payload bytes. Empty for freshly created nodes.
    pub bytes: Vec<u8>,
    /// Version stamp; stable and monotonically increasing per path,
    /// bumped on every successful write.
    pub version: u64,
}

/// Tagged failure kinds of coordination-service operations.
#[derive(Debug, Snafu)]
pub enum StoreError {
    /// The compare-and-swap pre-condition did not hold.
    #[snafu(display("version mismatch on {path}: expected {expected}, actual {actual}"))]
    VersionMismatch {
        /// Path of the contested node.
        path: String,
        /// Version the caller presented.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },
    /// The node does not exist.
    #[snafu(display("node {path} does not exist"))]
    NotFound {
        /// Path of the missing node.
        path: String,
    },
    /// The service could not be reached, or the call exceeded its
    /// deadline.
    #[snafu(display("transport failure during {operation} on {path}: {message}"))]
    Transport {
        /// The operation that failed.
        operation: &'static str,
        /// Path the operation targeted.
        path: String,
        /// Transport-level detail.
        message: String,
    },
}

impl StoreError {
    /// Whether this is a benign compare-and-swap mismatch.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, StoreError::VersionMismatch { .. })
    }
}

/// The coordination-service operations consumed by the lease core.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Idempotently create `path` and all its components. Fails only if
    /// the final node cannot be confirmed to exist afterwards.
    async fn ensure_path(&self, path: &str) -> Result<(), StoreError>;

    /// Read the payload and version of `path`.
    async fn read(&self, path: &str) -> Result<VersionedValue, StoreError>;

    /// Return the current version of `path` without its payload.
    async fn check_exists(&self, path: &str) -> Result<u64, StoreError>;

    /// Write `bytes` to `path` if and only if its version still equals
    /// `expected_version`. Returns the new version.
    async fn cas_write(&self, path: &str, bytes: &[u8], expected_version: u64) -> Result<u64, StoreError>;
}

/// Bound a store operation by a deadline, mapping expiry to a transport
/// failure so callers see one tagged error surface.
pub(crate) async fn with_deadline<T, F>(
    deadline: Duration,
    operation: &'static str,
    path: &str,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(outcome) => outcome,
        Err(_) => TransportSnafu {
            operation,
            path,
            message: "deadline exceeded",
        }
        .fail(),
    }
}
