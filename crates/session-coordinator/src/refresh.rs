//! Single-flight token renewal and the proactive refresh schedule.
//!
//! Every renewal trigger (the periodic check, a rejected request, a route
//! guard) goes through [`RefreshCoordinator::refresh`]. At most one renewal
//! call is in flight; later callers attach to the pending attempt and observe
//! the same [`RefreshOutcome`].
//!
//! The attempt runs as its own task, so it completes and its outcome is
//! applied even if every caller stops waiting. The in-flight handle is
//! installed before the network call starts and removed only after the
//! outcome has been written to the store and published.

use crate::backend::{AuthBackend, RenewalGrant};
use crate::clock::{Clock, SystemClock};
use crate::codec::{CredentialCodec, Freshness};
use crate::events::{ClearReason, SessionEvent, SessionEventBus};
use crate::fsm::{CoordinatorInput, CoordinatorMachine, CoordinatorState};
use crate::SessionError;
use booking_config_and_utils::Config;
use credential_storage::{CredentialStore, StorageResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Timing for the proactive schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Time between expiry checks
    pub check_interval: Duration,
    /// Remaining lifetime below which a token is renewed
    pub refresh_threshold: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(300),
        }
    }
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_interval: config.check_interval(),
            refresh_threshold: config.refresh_threshold(),
        }
    }
}

/// Result of one renewal attempt, shared by every caller that waited on it.
#[derive(Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New access token persisted and published
    Renewed { access_token: String },
    /// Renewal token refused; the session was torn down
    Rejected { status: u16 },
    /// Transport or other failure; the session is untouched
    Failed { reason: String },
    /// No renewal token stored
    NoCredential,
}

impl RefreshOutcome {
    pub fn is_renewed(&self) -> bool {
        matches!(self, RefreshOutcome::Renewed { .. })
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            RefreshOutcome::Renewed { access_token } => Some(access_token),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Renewed { .. } => "renewed",
            RefreshOutcome::Rejected { .. } => "rejected",
            RefreshOutcome::Failed { .. } => "failed",
            RefreshOutcome::NoCredential => "no_credential",
        }
    }
}

impl std::fmt::Debug for RefreshOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshOutcome::Renewed { .. } => f.write_str("Renewed"),
            RefreshOutcome::Rejected { status } => {
                f.debug_struct("Rejected").field("status", status).finish()
            }
            RefreshOutcome::Failed { reason } => {
                f.debug_struct("Failed").field("reason", reason).finish()
            }
            RefreshOutcome::NoCredential => f.write_str("NoCredential"),
        }
    }
}

/// Snapshot of the coordinator for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    /// A periodic schedule is armed
    pub scheduled: bool,
    /// A renewal call is pending
    pub in_flight: bool,
}

type SharedAttempt = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    id: u64,
    attempt: SharedAttempt,
    /// Began while `Stopped` and no `start()` has happened since
    from_stopped: bool,
}

/// Shutdown signal of the periodic task. Dropping it also ends the task.
struct Schedule {
    shutdown_tx: oneshot::Sender<()>,
}

impl Schedule {
    fn cancel(self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct Core {
    machine: CoordinatorMachine,
    in_flight: Option<InFlight>,
    schedule: Option<Schedule>,
    next_attempt_id: u64,
}

impl Core {
    fn state(&self) -> CoordinatorState {
        CoordinatorState::from(self.machine.state())
    }

    fn transition(&mut self, input: &CoordinatorInput) {
        let old_state = self.state();
        if self.machine.consume(input).is_err() {
            warn!(input = ?input, state = ?old_state, "Ignoring invalid refresh coordinator transition");
            return;
        }

        let new_state = self.state();
        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Refresh coordinator transition"
            );
        }
    }
}

struct Inner {
    store: Arc<CredentialStore>,
    backend: Arc<dyn AuthBackend>,
    bus: SessionEventBus,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
    core: Mutex<Core>,
}

/// Owns token renewal and the proactive refresh schedule.
///
/// Cheap to clone; clones share one coordinator. The schedule task holds only
/// a weak reference, so dropping the last clone ends it.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        backend: Arc<dyn AuthBackend>,
        bus: SessionEventBus,
        settings: RefreshSettings,
    ) -> Self {
        Self::with_clock(store, backend, bus, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        store: Arc<CredentialStore>,
        backend: Arc<dyn AuthBackend>,
        bus: SessionEventBus,
        clock: Arc<dyn Clock>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                bus,
                clock,
                settings,
                core: Mutex::new(Core {
                    machine: CoordinatorMachine::new(),
                    in_flight: None,
                    schedule: None,
                    next_attempt_id: 1,
                }),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.inner.backend
    }

    pub fn bus(&self) -> &SessionEventBus {
        &self.inner.bus
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    pub fn status(&self) -> CoordinatorStatus {
        let core = self.inner.core.lock();
        CoordinatorStatus {
            state: core.state(),
            scheduled: core.schedule.is_some(),
            in_flight: core.in_flight.is_some(),
        }
    }

    /// Arm the periodic check, replacing any previous schedule. The first
    /// check runs immediately.
    ///
    /// Also leaves `Stopped`, so call this after a fresh login.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut core = self.inner.core.lock();

        if let Some(previous) = core.schedule.take() {
            debug!("Replacing existing refresh schedule");
            previous.cancel();
        }
        if core.state() == CoordinatorState::Stopped {
            core.transition(&CoordinatorInput::Restarted);
        }
        if let Some(in_flight) = core.in_flight.as_mut() {
            // Settling must not drop the machine back into Stopped
            in_flight.from_stopped = false;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_schedule(
            Arc::downgrade(&self.inner),
            self.inner.settings.check_interval,
            shutdown_rx,
        ));
        core.schedule = Some(Schedule { shutdown_tx });

        info!(
            interval_secs = self.inner.settings.check_interval.as_secs(),
            threshold_secs = self.inner.settings.refresh_threshold.as_secs(),
            "Proactive token refresh started"
        );
    }

    /// Cancel the periodic check. A renewal already in flight still completes
    /// and its outcome is applied, but nothing is rescheduled.
    pub fn stop(&self) {
        let schedule = self.inner.core.lock().schedule.take();
        if let Some(schedule) = schedule {
            schedule.cancel();
            info!("Proactive token refresh stopped");
        }
    }

    /// Run one proactive check now.
    ///
    /// Refreshes only when the access token is still valid but inside the
    /// refresh threshold. Returns the outcome if a refresh ran.
    pub async fn check_now(&self) -> Option<RefreshOutcome> {
        if self.status().state == CoordinatorState::Stopped {
            trace!("Refresh coordinator stopped, skipping check");
            return None;
        }

        let credential = match self.inner.store.credential() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                trace!("No credential stored, skipping check");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Could not read credential for refresh check");
                return None;
            }
        };

        let now = self.inner.clock.now();
        let threshold = self.inner.settings.refresh_threshold;
        match CredentialCodec::decode(&credential.access_token).assess(now, threshold) {
            Freshness::Fresh => None,
            Freshness::Renewable { remaining } => {
                info!(
                    remaining_secs = remaining.num_seconds(),
                    "Access token near expiry, refreshing"
                );
                Some(self.refresh().await)
            }
            Freshness::Expired => {
                debug!("Access token already expired, leaving renewal to the next rejected request");
                None
            }
        }
    }

    /// Renew the access token, joining the pending attempt if there is one.
    pub async fn refresh(&self) -> RefreshOutcome {
        let attempt = {
            let mut core = self.inner.core.lock();
            match &core.in_flight {
                Some(in_flight) => {
                    debug!(attempt_id = in_flight.id, "Joining in-flight token refresh");
                    in_flight.attempt.clone()
                }
                None => self.begin_attempt(&mut core),
            }
        };

        attempt.await
    }

    fn begin_attempt(&self, core: &mut Core) -> SharedAttempt {
        let id = core.next_attempt_id;
        core.next_attempt_id += 1;
        let from_stopped = core.state() == CoordinatorState::Stopped;
        core.transition(&CoordinatorInput::AttemptStarted);

        let task = tokio::spawn(Arc::clone(&self.inner).run_attempt(id));

        let weak = Arc::downgrade(&self.inner);
        let attempt = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(attempt_id = id, error = %e, "Token refresh task failed");
                    let outcome = RefreshOutcome::Failed {
                        reason: format!("refresh task failed: {}", e),
                    };
                    if let Some(inner) = weak.upgrade() {
                        inner.settle(id, &outcome);
                    }
                    outcome
                }
            }
        }
        .boxed()
        .shared();

        core.in_flight = Some(InFlight {
            id,
            attempt: attempt.clone(),
            from_stopped,
        });
        attempt
    }
}

impl Inner {
    async fn run_attempt(self: Arc<Self>, id: u64) -> RefreshOutcome {
        let outcome = self.perform_refresh(id).await;

        match &outcome {
            RefreshOutcome::Renewed { access_token } => {
                self.bus.publish(&SessionEvent::CredentialRenewed {
                    access_token: access_token.clone(),
                });
            }
            RefreshOutcome::Rejected { .. } => {
                self.bus.publish(&SessionEvent::CredentialCleared {
                    reason: ClearReason::RenewalRejected,
                });
            }
            _ => {}
        }

        self.settle(id, &outcome);
        outcome
    }

    async fn perform_refresh(&self, id: u64) -> RefreshOutcome {
        let refresh_token = match self.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(attempt_id = id, "No renewal token stored");
                return RefreshOutcome::NoCredential;
            }
            Err(e) => {
                warn!(attempt_id = id, error = %e, "Could not read renewal token");
                return RefreshOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        debug!(attempt_id = id, "Refreshing access token");

        match self.backend.refresh(&refresh_token).await {
            Ok(grant) => match self.apply_grant(&grant) {
                Ok(()) => {
                    info!(
                        attempt_id = id,
                        rotated = grant.refresh_token.is_some(),
                        "Access token refreshed"
                    );
                    RefreshOutcome::Renewed {
                        access_token: grant.access_token,
                    }
                }
                Err(e) => {
                    error!(attempt_id = id, error = %e, "Could not persist refreshed token");
                    RefreshOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            Err(SessionError::AuthorizationRejected { status }) => {
                if !self.tear_down(&refresh_token) {
                    info!(attempt_id = id, status, "Rejected renewal token was already replaced, keeping session");
                    return RefreshOutcome::Failed {
                        reason: "renewal token superseded".to_string(),
                    };
                }
                warn!(attempt_id = id, status, "Renewal token rejected, ending session");
                RefreshOutcome::Rejected { status }
            }
            Err(e) => {
                warn!(
                    attempt_id = id,
                    error = %e,
                    transient = e.is_transient(),
                    "Token refresh failed, will retry on next check"
                );
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Renewal token and profile are replaced only when the response has them.
    fn apply_grant(&self, grant: &RenewalGrant) -> StorageResult<()> {
        self.store.set_access_token(&grant.access_token)?;
        if let Some(refresh_token) = &grant.refresh_token {
            self.store.set_refresh_token(refresh_token)?;
        }
        if let Some(profile) = &grant.profile {
            self.store.set_profile(profile)?;
        }
        Ok(())
    }

    /// Clear the session if it still holds `rejected`. A login that landed
    /// while the renewal was pending keeps its new credential.
    fn tear_down(&self, rejected: &str) -> bool {
        match self.store.refresh_token() {
            Ok(Some(current)) if current != rejected => return false,
            _ => {}
        }

        if let Err(e) = self.store.clear_credential() {
            error!(error = %e, "Failed to clear rejected credential");
        }
        let schedule = self.core.lock().schedule.take();
        if let Some(schedule) = schedule {
            schedule.cancel();
        }
        true
    }

    fn settle(&self, id: u64, outcome: &RefreshOutcome) {
        let mut core = self.core.lock();
        let from_stopped = match &core.in_flight {
            Some(in_flight) if in_flight.id == id => in_flight.from_stopped,
            _ => return,
        };
        core.in_flight = None;

        let input = match outcome {
            RefreshOutcome::Rejected { .. } => CoordinatorInput::SessionRejected,
            RefreshOutcome::Renewed { .. } => CoordinatorInput::AttemptSettled,
            _ if from_stopped => CoordinatorInput::SessionAbsent,
            _ => CoordinatorInput::AttemptSettled,
        };
        core.transition(&input);

        trace!(attempt_id = id, outcome = outcome.label(), "Token refresh settled");
    }
}

async fn run_schedule(
    inner: Weak<Inner>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("Refresh schedule cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                RefreshCoordinator { inner }.check_now().await;
            }
        }
    }
}
