//! The lease control loop.
//!
//! One scheduler task drives the state machine: a replica that is not
//! master tries to acquire the lease with a compare-and-swap on the
//! lease record, and a replica that is master renews it before the
//! guard deadline. The lease version observed or written last is the
//! CAS pre-condition of the next attempt, so two replicas can never
//! both succeed against the same version.
//!
//! The local deadline `end_lease_ms` is the single piece of shared
//! state: written only by the scheduler task, read wait-free by the
//! serving path through [`LeaseView`]. It is raised only after a CAS
//! success and zeroed on any demotion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::{InvalidLeasePeriodSnafu, LeaseError, SetupSnafu};
use super::promotion::{Promotion, PromotionWorker};
use super::view::LeaseView;
use crate::clock::Clock;
use crate::config::LeaseConfig;
use crate::panicker::Panicker;
use crate::state::StateManager;
use crate::store::{CoordinationStore, StoreError, with_deadline};

/// Lease-based master election service for one TSO replica.
pub struct LeaseManager<S: CoordinationStore + ?Sized> {
    host_and_port: String,
    config: LeaseConfig,
    store: Arc<S>,
    state_manager: Arc<dyn StateManager>,
    clock: Arc<dyn Clock>,
    panicker: Arc<dyn Panicker>,
    end_lease_ms: Arc<AtomicU64>,
}

impl<S: CoordinationStore + ?Sized + 'static> LeaseManager<S> {
    /// Create a manager for the replica advertised as `host_and_port`.
    pub fn new(
        host_and_port: impl Into<String>,
        config: LeaseConfig,
        store: Arc<S>,
        state_manager: Arc<dyn StateManager>,
        clock: Arc<dyn Clock>,
        panicker: Arc<dyn Panicker>,
    ) -> Self {
        Self {
            host_and_port: host_and_port.into(),
            config,
            store,
            state_manager,
            clock,
            panicker,
            end_lease_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read-only view of the lease state for the serving path. Valid
    /// before and after `start`; reports not-master until a lease is
    /// actually held.
    pub fn view(&self) -> LeaseView {
        LeaseView::new(self.end_lease_ms.clone(), self.clock.clone())
    }

    /// Ensure both coordination records exist, then start the scheduler
    /// and the promotion worker.
    pub async fn start(self) -> Result<LeaseHandle, LeaseError> {
        ensure!(self.config.lease_period_ms > 0, InvalidLeasePeriodSnafu);
        let deadline = self.config.store_deadline();

        for path in [&self.config.lease_path, &self.config.current_tso_path] {
            with_deadline(deadline, "ensure_path", path, self.store.ensure_path(path))
                .await
                .context(SetupSnafu { path: path.as_str() })?;
            with_deadline(deadline, "check_exists", path, self.store.check_exists(path))
                .await
                .context(SetupSnafu { path: path.as_str() })?;
            info!(%path, "coordination path ensured");
        }

        let view = self.view();
        let lease_period = self.config.lease_period();
        let guard_ms = self.config.guard_ms();

        // Capacity 1: under correct operation at most one promotion is
        // ever outstanding. A full queue is handled as a fatal fault.
        let (promotions, jobs) = mpsc::channel(1);
        let initializer = PromotionWorker::new(
            self.host_and_port.clone(),
            self.config.current_tso_path.clone(),
            deadline,
            self.store.clone(),
            self.state_manager,
            self.panicker.clone(),
        )
        .spawn(jobs);

        let controller = LeaseController {
            host_and_port: self.host_and_port,
            lease_path: self.config.lease_path,
            lease_period_ms: self.config.lease_period_ms,
            guard_ms,
            op_deadline: deadline,
            store: self.store,
            clock: self.clock,
            end_lease_ms: self.end_lease_ms,
            base_time_ms: 0,
            known_lease_version: 0,
            promotions,
            panicker: self.panicker.clone(),
        };

        let cancel = CancellationToken::new();
        let scheduler = tokio::spawn(run_scheduler(controller, cancel.clone()));

        Ok(LeaseHandle {
            view,
            cancel,
            scheduler,
            initializer,
            lease_period,
            panicker: self.panicker,
        })
    }
}

/// Handle to a running lease service.
pub struct LeaseHandle {
    view: LeaseView,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    initializer: JoinHandle<()>,
    lease_period: Duration,
    panicker: Arc<dyn Panicker>,
}

impl LeaseHandle {
    /// Clone the wait-free lease view.
    pub fn view(&self) -> LeaseView {
        self.view.clone()
    }

    /// Whether this replica currently holds the lease.
    pub fn in_lease_period(&self) -> bool {
        self.view.in_lease_period()
    }

    /// Stop the scheduler, wait for the in-flight iteration, and drain
    /// the promotion worker. The lease record is left as-is; it simply
    /// stops being renewed.
    pub async fn stop(self) {
        self.cancel.cancel();
        if self.scheduler.await.is_err() {
            warn!("lease scheduler task ended abnormally");
        }
        // The scheduler owned the last job sender, so the worker exits
        // once the queue is empty.
        match tokio::time::timeout(self.lease_period, self.initializer).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("state initializer task ended abnormally"),
            Err(_) => self
                .panicker
                .panic("state initializer failed to drain within one lease period", None),
        }
    }
}

/// One replica's side of the lease state machine. Owned by the
/// scheduler task; `end_lease_ms` is its only externally visible state.
pub(crate) struct LeaseController<S: CoordinationStore + ?Sized> {
    host_and_port: String,
    lease_path: String,
    lease_period_ms: u64,
    guard_ms: u64,
    op_deadline: Duration,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    end_lease_ms: Arc<AtomicU64>,
    base_time_ms: u64,
    known_lease_version: u64,
    promotions: mpsc::Sender<Promotion>,
    panicker: Arc<dyn Panicker>,
}

impl<S: CoordinationStore + ?Sized + 'static> LeaseController<S> {
    fn in_lease_period(&self) -> bool {
        self.clock.now_millis() <= self.end_lease_ms.load(Ordering::Acquire)
    }

    /// Run one acquire-or-renew step. An error is a transport failure;
    /// the caller logs it and retries on the next tick. The local
    /// deadline is never cleared by transport failures: the replica
    /// only demotes when the deadline passes or when it proves the
    /// lease is lost.
    pub(crate) async fn run_one_iteration(&mut self) -> Result<(), StoreError> {
        if !self.in_lease_period() {
            self.try_acquire().await
        } else {
            self.try_renew().await
        }
    }

    async fn try_acquire(&mut self) -> Result<(), StoreError> {
        self.base_time_ms = self.clock.now_millis();
        if self.write_lease_record().await? {
            let end_lease_ms = self.base_time_ms + self.lease_period_ms;
            self.end_lease_ms.store(end_lease_ms, Ordering::Release);
            info!(
                host = %self.host_and_port,
                lease_version = self.known_lease_version,
                end_lease_ms,
                "lease acquired, acting as master"
            );
            if self.promotions.try_send(Promotion).is_err() {
                // Either the worker died or an earlier promotion never
                // ran. Both leave this replica master with unpublished
                // coordinates.
                self.panicker
                    .panic("cannot submit tso state initialisation job", None);
            }
        }
        Ok(())
    }

    pub(crate) async fn try_renew(&mut self) -> Result<(), StoreError> {
        self.base_time_ms = self.clock.now_millis();
        if self.write_lease_record().await? {
            if self.clock.now_millis() > self.end_lease_ms.load(Ordering::Acquire) {
                // The CAS went through, but only after the old deadline
                // had already passed: the task stalled long enough that
                // continuous mastership cannot be claimed.
                self.end_lease_ms.store(0, Ordering::Release);
                warn!(
                    host = %self.host_and_port,
                    "lease expired before renewal completed, stepping down for re-election"
                );
            } else {
                let end_lease_ms = self.base_time_ms + self.lease_period_ms;
                self.end_lease_ms.store(end_lease_ms, Ordering::Release);
                trace!(
                    host = %self.host_and_port,
                    lease_version = self.known_lease_version,
                    end_lease_ms,
                    "lease renewed"
                );
            }
        } else {
            self.end_lease_ms.store(0, Ordering::Release);
            warn!(
                host = %self.host_and_port,
                lease_version = self.known_lease_version,
                "lease lost, another instance is master now"
            );
        }
        Ok(())
    }

    /// CAS our coordinates onto the lease record with the last known
    /// version as pre-condition. `Ok(true)` on success, `Ok(false)` on
    /// a version mismatch (someone else holds the lease), `Err` on
    /// transport failure.
    async fn write_lease_record(&mut self) -> Result<bool, StoreError> {
        let write = self
            .store
            .cas_write(&self.lease_path, self.host_and_port.as_bytes(), self.known_lease_version);
        match with_deadline(self.op_deadline, "cas_write", &self.lease_path, write).await {
            Ok(version) => {
                self.known_lease_version = version;
                trace!(host = %self.host_and_port, lease_version = version, "lease record written");
                Ok(true)
            }
            Err(error) if error.is_version_mismatch() => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Delay until the next iteration. While not master the lease
    /// version is refreshed first so the next acquisition attempt uses
    /// a current pre-condition; a failed refresh still waits a full
    /// lease period and lets the next iteration surface the error.
    pub(crate) async fn next_fire_delay(&mut self) -> Duration {
        if !self.in_lease_period() {
            let check = self.store.check_exists(&self.lease_path);
            match with_deadline(self.op_deadline, "check_exists", &self.lease_path, check).await {
                Ok(version) => {
                    self.known_lease_version = version;
                    trace!(
                        host = %self.host_and_port,
                        lease_version = version,
                        wait_ms = self.lease_period_ms,
                        "will try to acquire the lease"
                    );
                }
                Err(error) => {
                    debug!(%error, "lease version refresh failed, retrying after a full lease period");
                }
            }
            Duration::from_millis(self.lease_period_ms)
        } else {
            let now = self.clock.now_millis();
            let end_lease_ms = self.end_lease_ms.load(Ordering::Acquire);
            let wait_ms = end_lease_ms.saturating_sub(now).saturating_sub(self.guard_ms);
            trace!(
                host = %self.host_and_port,
                lease_version = self.known_lease_version,
                wait_ms,
                "will try to renew the lease"
            );
            Duration::from_millis(wait_ms)
        }
    }
}

/// The cooperative periodic runner: one iteration at a time, a
/// dynamically computed sleep in between, cancellation-aware.
async fn run_scheduler<S: CoordinationStore + ?Sized + 'static>(
    mut controller: LeaseController<S>,
    cancel: CancellationToken,
) {
    info!(
        host = %controller.host_and_port,
        lease_period_ms = controller.lease_period_ms,
        "lease scheduler started"
    );
    loop {
        let delay = controller.next_fire_delay().await;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if let Err(error) = controller.run_one_iteration().await {
            warn!(%error, "lease iteration failed, retrying on next tick");
        }
    }
    info!(host = %controller.host_and_port, "lease scheduler stopped");
}
