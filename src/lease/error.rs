//! Error types of the lease core.

use snafu::Snafu;

use crate::record::RecordError;
use crate::state::StateError;
use crate::store::StoreError;

/// Failure starting the lease service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LeaseError {
    /// A coordination path could not be created or confirmed.
    #[snafu(display("cannot ensure coordination path {path}: {source}"))]
    Setup {
        /// The path that could not be ensured.
        path: String,
        /// The underlying store failure.
        source: StoreError,
    },

    /// The configured lease period is zero.
    #[snafu(display("lease period must be positive"))]
    InvalidLeasePeriod,
}

/// Failure of the promotion job that runs once per lease acquisition.
///
/// Every variant is unrecoverable for the replica: the job either
/// proves that a second master exists, or leaves this replica master
/// without published coordinates. All of them are routed to the
/// panicker.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PromotionError {
    /// The state engine failed to reset.
    #[snafu(display("cannot reset tso state: {source}"))]
    StateReset {
        /// The collaborator failure.
        source: StateError,
    },

    /// The stored current-TSO record does not parse.
    #[snafu(display("corrupt record at {path}: {source}"))]
    CorruptRecord {
        /// Path of the corrupt record.
        path: String,
        /// Parse failure detail.
        source: RecordError,
    },

    /// The previously published epoch is not older than the one just
    /// minted, so the epoch source is not monotonic.
    #[snafu(display("epoch regression: previous epoch {previous} >= freshly minted epoch {minted}"))]
    EpochRegression {
        /// Epoch found in the stored record.
        previous: u64,
        /// Epoch returned by the state reset.
        minted: u64,
    },

    /// Another replica published its coordinates concurrently.
    #[snafu(display("split brain: {path} was rewritten while publishing this instance"))]
    SplitBrain {
        /// Path of the contested record.
        path: String,
    },

    /// The coordination service failed while publishing.
    #[snafu(display("coordination failure during promotion: {source}"))]
    Store {
        /// The underlying store failure.
        source: StoreError,
    },
}
