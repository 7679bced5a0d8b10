//! Lease-based master election.
//!
//! Multiple hot-standby TSO replicas share one lease record in the
//! coordination service. At any instant at most one replica holds the
//! lease and acts as master; mastership is bounded in time and must be
//! renewed before a guard deadline. On winning the lease a replica
//! resets the TSO state off the scheduling path and publishes its
//! coordinates for client discovery.
//!
//! ## Example
//!
//! ```ignore
//! use tso_ha::{LeaseConfig, LeaseManager};
//!
//! let manager = LeaseManager::new(
//!     host_and_port,
//!     LeaseConfig::load()?,
//!     store,
//!     state_manager,
//!     clock,
//!     panicker,
//! );
//! let handle = manager.start().await?;
//!
//! // Serving path, before emitting any master-authoritative reply:
//! handle.view().ensure_master()?;
//!
//! // Graceful shutdown:
//! handle.stop().await;
//! ```

mod error;
mod manager;
mod promotion;
mod view;

pub use error::{LeaseError, PromotionError};
pub use manager::{LeaseHandle, LeaseManager};
pub use view::{LeaseView, NotMaster};
