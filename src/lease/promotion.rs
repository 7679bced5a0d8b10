//! Asynchronous state initialisation and coordinate publication.
//!
//! Winning the lease triggers exactly one promotion: reset the TSO
//! state to mint a fresh epoch, then publish this replica's coordinates
//! for client discovery. Resetting may be slow, so the job runs on its
//! own task; blocking the lease scheduler here would let the lease
//! lapse at the very moment the replica won it.
//!
//! A failed promotion leaves the replica master without published
//! coordinates, or proves a second master exists. Neither is
//! survivable, so every escaping failure is routed to the panicker.

use std::sync::Arc;
use std::time::Duration;

use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::error::{
    CorruptRecordSnafu, EpochRegressionSnafu, PromotionError, SplitBrainSnafu, StateResetSnafu, StoreSnafu,
};
use crate::panicker::Panicker;
use crate::record::TsoRecord;
use crate::state::StateManager;
use crate::store::{CoordinationStore, with_deadline};

/// Marker submitted to the worker once per lease acquisition.
pub(crate) struct Promotion;

/// Single-consumer worker executing promotions off the scheduler task.
pub(crate) struct PromotionWorker<S: CoordinationStore + ?Sized> {
    host_and_port: String,
    current_tso_path: String,
    op_deadline: Duration,
    store: Arc<S>,
    state_manager: Arc<dyn StateManager>,
    panicker: Arc<dyn Panicker>,
}

impl<S: CoordinationStore + ?Sized + 'static> PromotionWorker<S> {
    pub(crate) fn new(
        host_and_port: String,
        current_tso_path: String,
        op_deadline: Duration,
        store: Arc<S>,
        state_manager: Arc<dyn StateManager>,
        panicker: Arc<dyn Panicker>,
    ) -> Self {
        Self {
            host_and_port,
            current_tso_path,
            op_deadline,
            store,
            state_manager,
            panicker,
        }
    }

    /// Consume jobs until every sender is gone. Runs on its own task.
    pub(crate) fn spawn(self, jobs: mpsc::Receiver<Promotion>) -> JoinHandle<()> {
        tokio::spawn(self.run(jobs))
    }

    async fn run(self, mut jobs: mpsc::Receiver<Promotion>) {
        while let Some(Promotion) = jobs.recv().await {
            if let Err(error) = self.promote().await {
                self.panicker
                    .panic("tso promotion failed, refusing to serve unannounced", Some(&error));
                return;
            }
        }
    }

    /// Reset the TSO state and publish `host:port#epoch`.
    pub(crate) async fn promote(&self) -> Result<(), PromotionError> {
        let state = self.state_manager.reset().await.context(StateResetSnafu)?;

        let path = self.current_tso_path.as_str();
        let previous = with_deadline(self.op_deadline, "read", path, self.store.read(path))
            .await
            .context(StoreSnafu)?;

        if !previous.bytes.is_empty() {
            let record = TsoRecord::parse(&previous.bytes).context(CorruptRecordSnafu { path })?;
            ensure!(
                record.epoch < state.epoch,
                EpochRegressionSnafu {
                    previous: record.epoch,
                    minted: state.epoch,
                }
            );
        }

        let record = TsoRecord::new(self.host_and_port.clone(), state.epoch);
        let encoded = record.encode();
        let write = self.store.cas_write(path, &encoded, previous.version);
        match with_deadline(self.op_deadline, "cas_write", path, write).await {
            Ok(version) => {
                info!(
                    host = %self.host_and_port,
                    epoch = state.epoch,
                    version,
                    "tso instance advertised"
                );
                Ok(())
            }
            Err(error) if error.is_version_mismatch() => SplitBrainSnafu { path }.fail(),
            Err(error) => Err(PromotionError::Store { source: error }),
        }
    }
}
