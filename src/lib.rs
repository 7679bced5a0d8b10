//! Lease-based master election core for a high-availability
//! transaction status oracle (TSO).
//!
//! A TSO deployment runs several hot-standby replicas. At most one of
//! them, the master, assigns transaction timestamps; the others wait.
//! Mastership is a renewable lease held in a strongly consistent
//! coordination service: a versioned compare-and-swap on the lease
//! record acquires and renews it, and the version stamp is the true
//! lease token. On becoming master a replica resets its timestamp state
//! to mint a fresh epoch and publishes `host:port#epoch` so clients can
//! find it.
//!
//! The serving path consults [`LeaseView::in_lease_period`] before
//! every externally visible decision; outside the lease window the
//! replica must reject requests with a retryable error rather than
//! answer as master.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod lease;
pub mod net;
pub mod panicker;
pub mod record;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LeaseConfig};
pub use lease::{LeaseError, LeaseHandle, LeaseManager, LeaseView, NotMaster, PromotionError};
pub use net::{NetError, host_and_port};
pub use panicker::{Panicker, ProcessExitPanicker, RecordingPanicker};
pub use record::{RecordError, TsoRecord};
pub use state::{SequenceStateManager, StateError, StateManager, TsoState};
pub use store::{CoordinationStore, MemoryCoordinationStore, StoreError, VersionedValue};
