//! Discord verification polling.
//!
//! SYSTEM CONTEXT
//! ==============
//! After registering, a member links their Discord identity by running
//! `/verify` in the club server. The backend grants the `is_verified` group
//! asynchronously, so the client polls a verification check a bounded number
//! of times while showing a cosmetic progress bar.
//!
//! DESIGN
//! ======
//! [`PollState`] is a plain state machine (`Idle`, `Polling`, `Succeeded`,
//! `Failed`) with pure transition methods. [`VerificationPoller`] drives it
//! with tokio tasks:
//! - a check task ticking every `check_interval`,
//! - a progress task ticking every `progress_interval`,
//! - a grace task that fires the success callback after `success_delay`.
//!
//! Every start bumps a cycle number under the task lock; a task whose cycle
//! is no longer current does nothing, so an aborted-but-still-running check
//! can never write into a newer cycle. Cleanup aborts all three tasks and is
//! safe to call any number of times.
//!
//! A target may expose session updates. The poller then watches them for its
//! whole lifetime and cancels as soon as the session is signed out, no matter
//! who performed the logout. A check that completes after sign-out is treated
//! as a cancellation, never as a failure.

#[cfg(test)]
#[path = "verification_test.rs"]
mod verification_test;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::session::{Session, SessionManager};
use crate::net::api::ApiError;

pub const MAX_ATTEMPTS: u32 = 3;
pub const CHECK_INTERVAL: Duration = Duration::from_millis(5000);
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(400);
pub const PROGRESS_STEP: u8 = 2;
pub const SUCCESS_DELAY: Duration = Duration::from_millis(1500);

/// Timer settings for one poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub max_attempts: u32,
    pub check_interval: Duration,
    pub progress_interval: Duration,
    pub progress_step: u8,
    pub success_delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            check_interval: CHECK_INTERVAL,
            progress_interval: PROGRESS_INTERVAL,
            progress_step: PROGRESS_STEP,
            success_delay: SUCCESS_DELAY,
        }
    }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    Succeeded,
    Failed,
}

/// What the check task should do after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Succeeded,
    Failed,
}

/// Decide the next step from an attempt number and its check result.
///
/// A check error fails immediately; a negative result fails once
/// `attempt >= max_attempts`.
#[must_use]
pub fn next_step(attempt: u32, max_attempts: u32, outcome: &Result<bool, ApiError>) -> PollStep {
    match outcome {
        Ok(true) => PollStep::Succeeded,
        Ok(false) if attempt >= max_attempts => PollStep::Failed,
        Ok(false) => PollStep::Continue,
        Err(_) => PollStep::Failed,
    }
}

/// Observable verification UI state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollState {
    pub phase: PollPhase,
    pub attempt_count: u32,
    /// Cosmetic sawtooth in `[0, 100)`; unrelated to `attempt_count`.
    pub progress: u8,
    pub is_loading: bool,
    pub show_success: bool,
    pub verification_failed: bool,
}

impl PollState {
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.phase == PollPhase::Polling
    }

    /// Enter `Polling` from any phase with counters reset.
    pub fn begin(&mut self) {
        self.phase = PollPhase::Polling;
        self.attempt_count = 0;
        self.progress = 0;
        self.is_loading = true;
        self.show_success = false;
        self.verification_failed = false;
    }

    pub fn record_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    pub fn advance_progress(&mut self, step: u8) {
        let next = u16::from(self.progress) + u16::from(step);
        self.progress = if next >= 100 { 0 } else { u8::try_from(next).unwrap_or(0) };
    }

    pub fn succeed(&mut self) {
        self.phase = PollPhase::Succeeded;
        self.is_loading = false;
        self.show_success = true;
        self.verification_failed = false;
    }

    pub fn fail(&mut self) {
        self.phase = PollPhase::Failed;
        self.is_loading = false;
        self.verification_failed = true;
        self.attempt_count = 0;
        self.progress = 0;
    }

    /// Drop back to `Idle` if polling; terminal phases are left alone.
    pub fn cancel(&mut self) {
        if self.phase == PollPhase::Polling {
            self.phase = PollPhase::Idle;
            self.attempt_count = 0;
            self.progress = 0;
            self.is_loading = false;
        }
    }
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// The check being polled and the callback fired on success.
#[async_trait::async_trait]
pub trait VerificationTarget: Send + Sync {
    /// Whether the member is verified yet. Errors fail the poll immediately.
    async fn check_verified(&self) -> Result<bool, ApiError>;

    /// Called once, `success_delay` after a successful check.
    fn on_verification_success(&self);

    /// Session the check depends on. Polling stops when it signs out.
    fn session_updates(&self) -> Option<watch::Receiver<Session>> {
        None
    }
}

fn signed_out(target: &dyn VerificationTarget) -> bool {
    target.session_updates().is_some_and(|rx| !rx.borrow().is_authenticated)
}

/// Polls the session's own profile and refreshes the session on success so
/// `is_verified` flips for every subscriber.
pub struct SessionVerification {
    session: Arc<SessionManager>,
}

impl SessionVerification {
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait::async_trait]
impl VerificationTarget for SessionVerification {
    async fn check_verified(&self) -> Result<bool, ApiError> {
        self.session.check_verified().await
    }

    fn on_verification_success(&self) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move { session.refresh().await });
    }

    fn session_updates(&self) -> Option<watch::Receiver<Session>> {
        Some(self.session.subscribe())
    }
}

// =============================================================================
// POLLER
// =============================================================================

#[derive(Default)]
struct PollTasks {
    cycle: u64,
    check: Option<JoinHandle<()>>,
    progress: Option<JoinHandle<()>>,
    grace: Option<JoinHandle<()>>,
}

impl PollTasks {
    fn abort_all(&mut self) {
        for handle in [self.check.take(), self.progress.take(), self.grace.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

struct PollShared {
    target: Arc<dyn VerificationTarget>,
    timing: PollTiming,
    state: watch::Sender<PollState>,
    tasks: Mutex<PollTasks>,
}

impl PollShared {
    fn tasks(&self) -> MutexGuard<'_, PollTasks> {
        self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn cancel(&self) {
        let mut tasks = self.tasks();
        self.cancel_locked(&mut tasks);
    }

    fn cancel_locked(&self, tasks: &mut PollTasks) {
        tasks.abort_all();
        tasks.cycle += 1;
        self.state.send_if_modified(|s| {
            let before = s.clone();
            s.cancel();
            *s != before
        });
    }
}

/// Drives one verification flow. Dropping the poller cancels it.
pub struct VerificationPoller {
    shared: Arc<PollShared>,
    session_watch: Option<JoinHandle<()>>,
}

impl VerificationPoller {
    /// Build an idle poller. If the target exposes session updates a watcher
    /// task is spawned, so this must then be called from a tokio runtime.
    #[must_use]
    pub fn new(target: Arc<dyn VerificationTarget>, timing: PollTiming) -> Self {
        let (state, _) = watch::channel(PollState::default());
        let updates = target.session_updates();
        let shared = Arc::new(PollShared { target, timing, state, tasks: Mutex::new(PollTasks::default()) });
        let session_watch = updates.map(|rx| tokio::spawn(watch_session(Arc::downgrade(&shared), rx)));
        Self { shared, session_watch }
    }

    #[must_use]
    pub fn snapshot(&self) -> PollState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn timing(&self) -> PollTiming {
        self.shared.timing
    }

    /// Start (or restart) polling. Any timers from a previous cycle are
    /// aborted first. Must be called from within a tokio runtime.
    pub fn start_checking(&self) {
        let mut tasks = self.shared.tasks();
        tasks.abort_all();
        tasks.cycle += 1;
        let cycle = tasks.cycle;
        self.shared.state.send_modify(PollState::begin);
        info!(cycle, max_attempts = self.shared.timing.max_attempts, "verification polling started");

        tasks.check = Some(tokio::spawn(run_checks(Arc::clone(&self.shared), cycle)));
        tasks.progress = Some(tokio::spawn(run_progress(Arc::clone(&self.shared), cycle)));
    }

    /// Stop all timers. A poll in progress returns to `Idle` without firing
    /// the success callback or entering `Failed`; a pending success callback
    /// is dropped.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl Drop for VerificationPoller {
    fn drop(&mut self) {
        if let Some(watcher) = self.session_watch.take() {
            watcher.abort();
        }
        self.cancel();
    }
}

/// Log out from inside the verification flow: polling is cancelled before the
/// session is torn down.
pub async fn logout_during_verification(poller: &VerificationPoller, session: &SessionManager) {
    poller.cancel();
    session.logout().await;
}

// =============================================================================
// TASKS
// =============================================================================

async fn run_checks(shared: Arc<PollShared>, cycle: u64) {
    let period = shared.timing.check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let attempt = {
            let tasks = shared.tasks();
            if tasks.cycle != cycle {
                return;
            }
            let mut attempt = 0;
            shared.state.send_modify(|s| attempt = s.record_attempt());
            attempt
        };

        let outcome = shared.target.check_verified().await;
        if signed_out(shared.target.as_ref()) {
            let mut tasks = shared.tasks();
            if tasks.cycle == cycle {
                debug!(cycle, attempt, "session ended during check; cancelling");
                tasks.check = None;
                shared.cancel_locked(&mut tasks);
            }
            return;
        }
        if let Err(ref e) = outcome {
            warn!(cycle, attempt, error = %e, "verification check failed");
        }

        match next_step(attempt, shared.timing.max_attempts, &outcome) {
            PollStep::Continue => debug!(cycle, attempt, "not verified yet"),
            PollStep::Succeeded => {
                finish(&shared, cycle, PollStep::Succeeded);
                return;
            }
            PollStep::Failed => {
                finish(&shared, cycle, PollStep::Failed);
                return;
            }
        }
    }
}

/// Apply a terminal step for `cycle`, tearing down the progress timer and,
/// on success, scheduling the delayed callback.
fn finish(shared: &Arc<PollShared>, cycle: u64, step: PollStep) {
    let mut tasks = shared.tasks();
    if tasks.cycle != cycle {
        return;
    }
    if let Some(progress) = tasks.progress.take() {
        progress.abort();
    }
    // The check task is the caller and is about to return.
    tasks.check = None;

    if step == PollStep::Succeeded {
        info!(cycle, "verification succeeded");
        shared.state.send_modify(PollState::succeed);
        let delay = shared.timing.success_delay;
        let grace_shared = Arc::clone(shared);
        tasks.grace = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = {
                let mut tasks = grace_shared.tasks();
                let current = tasks.cycle == cycle;
                if current {
                    tasks.grace = None;
                }
                current
            };
            if still_current {
                grace_shared.target.on_verification_success();
            }
        }));
    } else {
        info!(cycle, "verification gave up");
        shared.state.send_modify(PollState::fail);
    }
}

/// Cancel polling whenever the watched session signs out.
async fn watch_session(shared: Weak<PollShared>, mut updates: watch::Receiver<Session>) {
    while updates.changed().await.is_ok() {
        let authenticated = updates.borrow_and_update().is_authenticated;
        if authenticated {
            continue;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        info!("session signed out; verification polling cancelled");
        shared.cancel();
    }
}

async fn run_progress(shared: Arc<PollShared>, cycle: u64) {
    let period = shared.timing.progress_interval;
    let step = shared.timing.progress_step;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let tasks = shared.tasks();
        if tasks.cycle != cycle {
            return;
        }
        shared.state.send_modify(|s| s.advance_progress(step));
    }
}
