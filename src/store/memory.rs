//! In-memory coordination store for tests and simulation.
//!
//! Mirrors the behaviour of a real coordination service without network
//! I/O: per-path version counters that start at zero on creation and
//! bump on every successful write, compare-and-swap semantics, and two
//! fault hooks used to stage failure scenarios (a transport-fault
//! switch, and version bumps that emulate a concurrent writer).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CoordinationStore, StoreError, VersionedValue};

#[derive(Debug, Default, Clone)]
struct Node {
    bytes: Vec<u8>,
    version: u64,
}

/// Deterministic in-memory implementation of [`CoordinationStore`].
#[derive(Default)]
pub struct MemoryCoordinationStore {
    nodes: Mutex<HashMap<String, Node>>,
    /// While set, every operation fails with a transport error.
    transport_faults: AtomicBool,
    /// Paths whose version is bumped right after the next read,
    /// emulating a writer racing the read-then-cas sequence.
    bump_after_read: Mutex<Vec<String>>,
}

impl MemoryCoordinationStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Toggle transport failures for every subsequent operation.
    pub fn set_transport_faults(&self, failing: bool) {
        self.transport_faults.store(failing, Ordering::Release);
    }

    /// Overwrite `path` unconditionally, bumping its version; creates
    /// the node if needed. Emulates an external agent writing behind
    /// the lease holder's back.
    pub async fn force_write(&self, path: &str, bytes: &[u8]) -> u64 {
        let mut nodes = self.nodes.lock().await;
        let node = nodes.entry(path.to_string()).or_default();
        node.bytes = bytes.to_vec();
        node.version += 1;
        node.version
    }

    /// Arrange for `path`'s version to be bumped immediately after the
    /// next [`CoordinationStore::read`] of it, so a following
    /// compare-and-swap observes a mismatch.
    pub async fn bump_version_after_next_read(&self, path: &str) {
        self.bump_after_read.lock().await.push(path.to_string());
    }

    /// Current version of `path`, if it exists.
    pub async fn version_of(&self, path: &str) -> Option<u64> {
        self.nodes.lock().await.get(path).map(|node| node.version)
    }

    /// Current payload of `path`, if it exists.
    pub async fn value_of(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes.lock().await.get(path).map(|node| node.bytes.clone())
    }

    fn check_transport(&self, operation: &'static str, path: &str) -> Result<(), StoreError> {
        if self.transport_faults.load(Ordering::Acquire) {
            return Err(StoreError::Transport {
                operation,
                path: path.to_string(),
                message: "injected transport fault".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn ensure_path(&self, path: &str) -> Result<(), StoreError> {
        self.check_transport("ensure_path", path)?;
        let mut nodes = self.nodes.lock().await;
        nodes.entry(path.to_string()).or_default();
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<VersionedValue, StoreError> {
        self.check_transport("read", path)?;
        let mut nodes = self.nodes.lock().await;
        let node = nodes.get(path).cloned().ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;

        let mut pending = self.bump_after_read.lock().await;
        if let Some(position) = pending.iter().position(|p| p == path) {
            pending.remove(position);
            if let Some(stored) = nodes.get_mut(path) {
                stored.version += 1;
            }
        }

        Ok(VersionedValue {
            bytes: node.bytes,
            version: node.version,
        })
    }

    async fn check_exists(&self, path: &str) -> Result<u64, StoreError> {
        self.check_transport("check_exists", path)?;
        let nodes = self.nodes.lock().await;
        nodes
            .get(path)
            .map(|node| node.version)
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn cas_write(&self, path: &str, bytes: &[u8], expected_version: u64) -> Result<u64, StoreError> {
        self.check_transport("cas_write", path)?;
        let mut nodes = self.nodes.lock().await;
        let node = nodes.get_mut(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;

        if node.version != expected_version {
            return Err(StoreError::VersionMismatch {
                path: path.to_string(),
                expected: expected_version,
                actual: node.version,
            });
        }

        node.bytes = bytes.to_vec();
        node.version += 1;
        Ok(node.version)
    }
}
