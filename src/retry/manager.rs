use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::{error_code, sanitize_for_logging, ErrorCode};

use super::schedule::BackoffSchedule;
use super::state::RetryState;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// The operation a [`RetryManager`] repeats until it succeeds.
///
/// Must be idempotent: it may run many times for one outage and its result
/// is thrown away when the cycle was cancelled while it ran.
#[async_trait]
pub trait RetryAction: Send + Sync {
    async fn attempt(&self) -> Result<()>;
}

/// Receives every schedule, success and reset transition.
pub trait RetryStateObserver: Send + Sync {
    fn state_changed(&self, state: &RetryState);
}

impl<F> RetryStateObserver for F
where
    F: Fn(&RetryState) + Send + Sync,
{
    fn state_changed(&self, state: &RetryState) {
        self(state)
    }
}

/// A state change stamped with its position in lock order.
struct Notification {
    seq: u64,
    observer: Arc<dyn RetryStateObserver>,
    state: RetryState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled(u64),
    Manual,
}

struct PendingAttempt {
    id: u64,
    timer: CancellationToken,
    delay: Duration,
    due: Instant,
    due_at: chrono::DateTime<Utc>,
}

struct RetryCore {
    attempt_number: u32,
    last_error: Option<String>,
    last_error_code: Option<ErrorCode>,
    running: bool,
    cycle: Option<CancellationToken>,
    pending: Option<PendingAttempt>,
    next_timer_id: u64,
    /// Sequence number of the last notification handed out.
    next_seq: u64,
    action: Option<Arc<dyn RetryAction>>,
    observer: Option<Arc<dyn RetryStateObserver>>,
}

struct RetryShared {
    name: String,
    schedule: BackoffSchedule,
    core: Mutex<RetryCore>,
    /// Held for the duration of an attempt so attempts never overlap.
    attempt_gate: tokio::sync::Mutex<()>,
    /// Sequence number of the last delivered notification. Held while the
    /// observer runs so deliveries never interleave.
    delivered: Mutex<u64>,
}

impl RetryShared {
    fn lock_core(&self) -> MutexGuard<'_, RetryCore> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn snapshot(&self, core: &RetryCore) -> RetryState {
        let mut state = RetryState {
            attempt_number: core.attempt_number,
            is_retrying: core.running,
            max_interval_reached: self.schedule.is_max_interval(core.attempt_number),
            last_error: core.last_error.clone(),
            last_error_code: core.last_error.as_ref().and(core.last_error_code),
            ..RetryState::default()
        };

        if let (true, Some(pending)) = (core.running, core.pending.as_ref()) {
            let remaining = pending.due.saturating_duration_since(Instant::now());
            state.next_retry_in_ms = duration_ms(remaining);
            state.next_retry_at = Some(pending.due_at);
        }

        state
    }

    /// Stamps `state` for delivery. Must be called with the core lock held.
    fn stamp(&self, core: &mut RetryCore, state: RetryState) -> Option<Notification> {
        let Some(observer) = core.observer.clone() else {
            log_debug!("[{}] no retry state observer installed", self.name);
            return None;
        };
        core.next_seq = core.next_seq.wrapping_add(1);
        Some(Notification {
            seq: core.next_seq,
            observer,
            state,
        })
    }

    /// Delivers `notification` unless a later one already went out.
    ///
    /// Observers run with the delivery lock held and must not call back into
    /// the manager's mutating methods.
    fn deliver(&self, notification: Option<Notification>) {
        let Some(notification) = notification else {
            return;
        };

        let mut delivered = match self.delivered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if notification.seq <= *delivered {
            log_debug!("[{}] dropping superseded retry state", self.name);
            return;
        }
        *delivered = notification.seq;
        notification.observer.state_changed(&notification.state);
    }

    /// Cancels the pending timer and the cycle, keeping the recorded error.
    fn halt(&self, core: &mut RetryCore) {
        if let Some(pending) = core.pending.take() {
            pending.timer.cancel();
        }
        if let Some(cycle) = core.cycle.take() {
            cycle.cancel();
        }
        core.running = false;
        core.attempt_number = 0;
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Arms the one-shot timer for the current attempt number.
fn schedule_next(shared: &Arc<RetryShared>, core: &mut RetryCore) -> Option<Notification> {
    let cycle = core.cycle.clone()?;

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(err) => {
            log_error!("[{}] cannot schedule retry outside a tokio runtime: {err}", shared.name);
            return None;
        }
    };

    if let Some(previous) = core.pending.take() {
        previous.timer.cancel();
    }

    let delay = shared.schedule.delay_for(core.attempt_number);
    let id = core.next_timer_id;
    core.next_timer_id = core.next_timer_id.wrapping_add(1);

    let timer = CancellationToken::new();
    let due = Instant::now() + delay;
    let due_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    core.pending = Some(PendingAttempt {
        id,
        timer: timer.clone(),
        delay,
        due,
        due_at,
    });

    log_info!(
        "[{}] retry scheduled in {:?} (attempt {})",
        shared.name,
        delay,
        core.attempt_number + 1
    );

    let task_shared = Arc::clone(shared);
    runtime.spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => return,
            _ = time::sleep_until(due) => {}
        }
        run_attempt(task_shared, cycle, Trigger::Scheduled(id)).await;
    });

    let mut state = shared.snapshot(core);
    state.next_retry_in_ms = duration_ms(delay);
    shared.stamp(core, state)
}

async fn run_attempt(shared: Arc<RetryShared>, cycle: CancellationToken, trigger: Trigger) {
    let _gate = shared.attempt_gate.lock().await;

    let action = {
        let mut core = shared.lock_core();
        if cycle.is_cancelled() {
            return;
        }
        if let Trigger::Scheduled(id) = trigger {
            match core.pending.as_ref() {
                Some(pending) if pending.id == id && !pending.timer.is_cancelled() => {
                    core.pending = None;
                }
                _ => return,
            }
        }
        core.action.clone()
    };

    let Some(action) = action else {
        log_warn!("[{}] no retry action configured", shared.name);
        return;
    };

    log_info!("[{}] attempting retry...", shared.name);
    let result = action.attempt().await;

    let notification = {
        let mut core = shared.lock_core();
        if cycle.is_cancelled() {
            log_debug!("[{}] discarding result of a cancelled retry attempt", shared.name);
            return;
        }

        match result {
            Ok(()) => {
                log_info!("[{}] retry succeeded", shared.name);
                shared.halt(&mut core);
                core.last_error = None;
                core.last_error_code = None;
                shared.stamp(&mut core, RetryState::cleared())
            }
            Err(err) => {
                log_warn!(
                    "[{}] retry failed: {}",
                    shared.name,
                    sanitize_for_logging(&format!("{err:#}"))
                );
                core.last_error = Some(format!("{err:#}"));
                if let Some(code) = error_code(&err) {
                    core.last_error_code = Some(code);
                }
                // A manual attempt restarts the schedule, so its failure waits the first step.
                if trigger != Trigger::Manual {
                    core.attempt_number = core.attempt_number.saturating_add(1);
                }
                schedule_next(&shared, &mut core)
            }
        }
    };

    shared.deliver(notification);
}

/// Retries a failed connection on a backoff schedule until it succeeds.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct RetryManager {
    shared: Arc<RetryShared>,
}

impl RetryManager {
    /// Manager on the default 5s/10s/30s/60s schedule. `name` tags log lines.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_schedule(name, BackoffSchedule::default())
    }

    pub fn with_schedule(name: impl Into<String>, schedule: BackoffSchedule) -> Self {
        Self {
            shared: Arc::new(RetryShared {
                name: name.into(),
                schedule,
                core: Mutex::new(RetryCore {
                    attempt_number: 0,
                    last_error: None,
                    last_error_code: None,
                    running: false,
                    cycle: None,
                    pending: None,
                    next_timer_id: 0,
                    next_seq: 0,
                    action: None,
                    observer: None,
                }),
                attempt_gate: tokio::sync::Mutex::new(()),
                delivered: Mutex::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.shared.schedule
    }

    pub fn set_callbacks(&self, action: Arc<dyn RetryAction>, observer: Arc<dyn RetryStateObserver>) {
        let mut core = self.shared.lock_core();
        core.action = Some(action);
        core.observer = Some(observer);
    }

    /// Begins a retry cycle for `err`.
    ///
    /// An active cycle only records the new error; its backoff progress is
    /// kept so repeated reports of one outage do not restart the schedule.
    pub fn start(&self, err: &anyhow::Error, code: Option<ErrorCode>) {
        let notification = {
            let mut core = self.shared.lock_core();
            core.last_error = Some(format!("{err:#}"));
            core.last_error_code = code;

            if core.running {
                log_debug!("[{}] retry already active, updated last error", self.shared.name);
                return;
            }

            if core.action.is_none() {
                log_warn!("[{}] starting retry cycle without a retry action", self.shared.name);
            }

            core.attempt_number = 0;
            core.running = true;
            core.cycle = Some(CancellationToken::new());
            schedule_next(&self.shared, &mut core)
        };

        self.shared.deliver(notification);
    }

    /// Cancels any pending attempt. The last error stays recorded.
    pub fn stop(&self) {
        let mut core = self.shared.lock_core();
        self.shared.halt(&mut core);
    }

    /// Stops retrying, forgets the error and emits the cleared state.
    pub fn reset(&self) {
        let notification = {
            let mut core = self.shared.lock_core();
            self.shared.halt(&mut core);
            core.last_error = None;
            core.last_error_code = None;
            self.shared.stamp(&mut core, RetryState::cleared())
        };

        self.shared.deliver(notification);
    }

    /// Attempts immediately and restarts the backoff from its first step.
    pub fn manual_retry(&self) {
        let cycle = {
            let mut core = self.shared.lock_core();
            if core.action.is_none() {
                log_warn!("[{}] manual retry requested with no retry action", self.shared.name);
                return;
            }

            let cycle = match core.cycle.as_ref() {
                Some(cycle) if !cycle.is_cancelled() => cycle.clone(),
                _ => {
                    let cycle = CancellationToken::new();
                    core.cycle = Some(cycle.clone());
                    cycle
                }
            };
            core.running = true;
            if let Some(pending) = core.pending.take() {
                pending.timer.cancel();
            }
            core.attempt_number = 0;
            cycle
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                log_error!("[{}] cannot run manual retry outside a tokio runtime: {err}", self.shared.name);
                return;
            }
        };

        log_info!("[{}] manual retry requested", self.shared.name);
        runtime.spawn(run_attempt(Arc::clone(&self.shared), cycle, Trigger::Manual));
    }

    pub fn state(&self) -> RetryState {
        let core = self.shared.lock_core();
        self.shared.snapshot(&core)
    }

    pub fn is_retrying(&self) -> bool {
        self.shared.lock_core().running
    }

    /// Delay of the currently scheduled attempt, if one is pending.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.shared.lock_core().pending.as_ref().map(|pending| pending.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyAction {
        failures: usize,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        work: Duration,
    }

    impl FlakyAction {
        fn new(failures: usize) -> Arc<Self> {
            Self::slow(failures, Duration::ZERO)
        }

        fn slow(failures: usize, work: Duration) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                work,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RetryAction for FlakyAction {
        async fn attempt(&self) -> Result<()> {
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            if !self.work.is_zero() {
                time::sleep(self.work).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(AppError::new(ErrorCode::PlexUnreachable, format!("still offline ({call})")).into())
            } else {
                Ok(())
            }
        }
    }

    fn recording_observer() -> (Arc<Mutex<Vec<RetryState>>>, Arc<dyn RetryStateObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn RetryStateObserver> =
            Arc::new(move |state: &RetryState| sink.lock().unwrap().push(state.clone()));
        (seen, observer)
    }

    fn outage(message: &str) -> anyhow::Error {
        AppError::new(ErrorCode::PlexUnreachable, message).into()
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_through_schedule_until_success() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(4);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        time::sleep(Duration::from_secs(5 + 10 + 30 + 60 + 60 + 1)).await;

        let states = seen.lock().unwrap().clone();
        let delays: Vec<u64> = states
            .iter()
            .filter(|state| state.is_retrying)
            .map(|state| state.next_retry_in_ms / 1000)
            .collect();
        assert_eq!(delays, vec![5, 10, 30, 60, 60]);
        assert_eq!(states.last(), Some(&RetryState::cleared()));
        assert_eq!(action.calls(), 5);
        assert!(!manager.is_retrying());
        assert_eq!(manager.state(), RetryState::cleared());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_states_track_attempts_and_max_interval() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(usize::MAX);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action, observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        time::sleep(Duration::from_secs(5 + 10 + 30 + 1)).await;

        let states = seen.lock().unwrap().clone();
        let attempts: Vec<u32> = states.iter().map(|state| state.attempt_number).collect();
        let maxed: Vec<bool> = states.iter().map(|state| state.max_interval_reached).collect();
        assert_eq!(attempts, vec![0, 1, 2, 3]);
        assert_eq!(maxed, vec![false, false, false, true]);

        let current = manager.state();
        assert!(current.is_retrying);
        assert_eq!(current.attempt_number, 3);
        assert_eq!(current.last_error_code, Some(ErrorCode::PlexUnreachable));
        assert_eq!(current.last_error.as_deref(), Some("still offline (2)"));
        assert_eq!(current.next_retry_in(), Duration::from_secs(59));
        assert!(current.next_retry_at.is_some());

        manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_only_updates_the_error() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(0);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("first"), Some(ErrorCode::PlexUnreachable));
        time::sleep(Duration::from_secs(2)).await;
        manager.start(&outage("second"), Some(ErrorCode::Timeout));

        let state = manager.state();
        assert_eq!(state.attempt_number, 0);
        assert_eq!(state.last_error.as_deref(), Some("second"));
        assert_eq!(state.last_error_code, Some(ErrorCode::Timeout));
        assert_eq!(state.next_retry_in(), Duration::from_secs(3));
        assert_eq!(seen.lock().unwrap().len(), 1, "schedule must not restart");

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(action.calls(), 1);
        assert!(!manager.is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_retry_fires_now_and_restarts_backoff() {
        let manager = RetryManager::new("Discord");
        let action = FlakyAction::new(usize::MAX);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("discord closed"), Some(ErrorCode::DiscordNotRunning));
        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(action.calls(), 1);
        assert_eq!(manager.pending_delay(), Some(Duration::from_secs(10)));

        manager.manual_retry();
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(action.calls(), 2, "manual retry runs without waiting");

        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.attempt_number, 0);
        assert_eq!(last.next_retry_in_ms, 5_000);
        assert_eq!(manager.pending_delay(), Some(Duration::from_secs(5)));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(action.calls(), 3);
        assert_eq!(manager.pending_delay(), Some(Duration::from_secs(10)));

        manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_retry_while_idle_starts_a_cycle() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(0);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.manual_retry();
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(action.calls(), 1);
        assert!(!manager.is_retrying());
        assert_eq!(seen.lock().unwrap().last(), Some(&RetryState::cleared()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_error_and_cancels_timer() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(0);
        let (_seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        manager.stop();
        time::sleep(Duration::from_secs(30)).await;

        assert_eq!(action.calls(), 0);
        let state = manager.state();
        assert!(!state.is_retrying);
        assert_eq!(state.last_error.as_deref(), Some("server offline"));
        assert_eq!(state.next_retry_in_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_error_and_emits_cleared_state() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::new(0);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        manager.reset();
        time::sleep(Duration::from_secs(30)).await;

        assert_eq!(action.calls(), 0);
        assert_eq!(manager.state(), RetryState::cleared());
        assert_eq!(seen.lock().unwrap().last(), Some(&RetryState::cleared()));
    }

    #[tokio::test(start_paused = true)]
    async fn result_of_cancelled_attempt_is_discarded() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::slow(0, Duration::from_secs(2));
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        time::sleep(Duration::from_secs(6)).await;
        manager.stop();
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(action.calls(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1, "late success must not emit");
        let state = manager.state();
        assert!(!state.is_retrying);
        assert_eq!(state.last_error.as_deref(), Some("server offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_never_overlap() {
        let manager = RetryManager::new("Plex");
        let action = FlakyAction::slow(usize::MAX, Duration::from_secs(1));
        let (_seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.manual_retry();
        manager.manual_retry();
        manager.manual_retry();
        time::sleep(Duration::from_secs(4)).await;

        assert_eq!(action.max_in_flight.load(Ordering::SeqCst), 1);
        manager.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reset_during_slow_observer_still_ends_cleared() {
        let schedule = BackoffSchedule::new(vec![Duration::from_millis(20)]).unwrap();
        let manager = RetryManager::with_schedule("Plex", schedule);

        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn RetryStateObserver> = Arc::new(move |state: &RetryState| {
            if state.is_retrying && state.attempt_number == 1 {
                let _ = entered_tx.lock().unwrap().send(());
                let _ = release_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(std::time::Duration::from_secs(5));
            }
            sink.lock().unwrap().push(state.clone());
        });
        manager.set_callbacks(FlakyAction::new(usize::MAX), observer);

        manager.start(&outage("server offline"), Some(ErrorCode::PlexUnreachable));
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(std::time::Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("first failed attempt should reach the observer");

        let resetting = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.reset())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        release_tx.send(()).unwrap();
        resetting.join().unwrap();

        assert!(!manager.is_retrying());
        let states = seen.lock().unwrap().clone();
        assert_eq!(states.last(), Some(&RetryState::cleared()));
        assert!(states[states.len() - 2].is_retrying);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_callbacks_degrade_to_noop() {
        let manager = RetryManager::new("Plex");

        manager.manual_retry();
        manager.start(&outage("server offline"), None);
        time::sleep(Duration::from_secs(6)).await;

        assert!(manager.is_retrying());
        manager.reset();
        assert!(!manager.is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_schedule_is_used() {
        let schedule = BackoffSchedule::new(vec![Duration::from_millis(100), Duration::from_millis(300)]).unwrap();
        let manager = RetryManager::with_schedule("Test", schedule);
        let action = FlakyAction::new(2);
        let (seen, observer) = recording_observer();
        manager.set_callbacks(action.clone(), observer);

        manager.start(&anyhow::anyhow!("boom"), None);
        time::sleep(Duration::from_millis(100 + 300 + 300 + 50)).await;

        let delays: Vec<u64> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|state| state.is_retrying)
            .map(|state| state.next_retry_in_ms)
            .collect();
        assert_eq!(delays, vec![100, 300, 300]);
        assert_eq!(action.calls(), 3);
        assert!(!manager.is_retrying());
    }
}
