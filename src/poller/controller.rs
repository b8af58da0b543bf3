use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::sanitize_for_logging;
use crate::models::MusicSession;

use super::loop_worker::poll_loop;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Slots in the emission stream. A full slot drops new updates.
const EMISSION_BUFFER: usize = 1;

/// Current session for the monitored user, `None` when nothing is playing.
pub type SessionUpdate = Option<MusicSession>;

/// Where the poller gets its snapshots from.
///
/// Implementations bound each call with their own timeout (a few hundred
/// milliseconds keeps polling responsive) and must tolerate being called at
/// the polling cadence indefinitely.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Music sessions currently active for `user_id`, most relevant first.
    async fn fetch_sessions(&self, user_id: &str) -> Result<Vec<MusicSession>>;
}

/// Connectivity health notifications from a [`SessionPoller`].
pub trait PollerObserver: Send + Sync {
    /// Called once when a failed fetch moves the poller into the error state.
    fn on_error(&self, err: &anyhow::Error);

    /// Called once when a successful fetch leaves the error state.
    fn on_recovered(&self);
}

/// Receiving half of the poller's single-slot emission channel.
///
/// Clones share one underlying receiver. `recv` yields `None` once the
/// polling loop has terminated and the buffered update (if any) was taken.
#[derive(Clone)]
pub struct SessionStream {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<SessionUpdate>>>,
}

impl SessionStream {
    fn new(rx: mpsc::Receiver<SessionUpdate>) -> Self {
        Self {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    pub async fn recv(&self) -> Option<SessionUpdate> {
        self.rx.lock().await.recv().await
    }
}

pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

pub(super) struct PollerState {
    pub(super) running: bool,
    pub(super) interval: Duration,
    pub(super) in_error_state: bool,
    pub(super) last_error_time: Option<DateTime<Utc>>,
    pub(super) observer: Option<Arc<dyn PollerObserver>>,
    pub(super) stop_token: Option<CancellationToken>,
    pub(super) stream: Option<SessionStream>,
    /// Bumped on every start so a late-exiting loop never clears a newer run.
    pub(super) generation: u64,
}

pub(super) struct PollerShared {
    pub(super) source: Arc<dyn SessionSource>,
    pub(super) user_id: String,
    state: Mutex<PollerState>,
}

impl PollerShared {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, PollerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(super) fn interval(&self) -> Duration {
        self.lock_state().interval
    }

    /// Records a failed fetch; notifies only on the healthy -> error edge.
    pub(super) fn record_failure(&self, err: &anyhow::Error) {
        log_warn!(
            "session poll for user {} failed: {}",
            self.user_id,
            sanitize_for_logging(&format!("{err:#}"))
        );

        let (was_in_error, observer) = {
            let mut state = self.lock_state();
            let was_in_error = state.in_error_state;
            state.in_error_state = true;
            state.last_error_time = Some(Utc::now());
            (was_in_error, state.observer.clone())
        };

        if was_in_error {
            return;
        }

        match observer {
            Some(observer) => observer.on_error(err),
            None => log_warn!("poller entered error state with no observer installed"),
        }
    }

    /// Records a successful fetch; notifies only on the error -> healthy edge.
    pub(super) fn record_success(&self) {
        let (was_in_error, observer) = {
            let mut state = self.lock_state();
            let was_in_error = state.in_error_state;
            state.in_error_state = false;
            (was_in_error, state.observer.clone())
        };

        if !was_in_error {
            return;
        }

        log_info!("session source recovered for user {}", self.user_id);
        if let Some(observer) = observer {
            observer.on_recovered();
        }
    }

    /// Runs when a polling loop ends, whatever the exit path.
    pub(super) fn finish_run(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        state.running = false;
        state.stop_token = None;
        state.stream = None;
    }
}

/// Periodically fetches the monitored user's session and forwards changes.
///
/// Cloning yields another handle to the same poller.
#[derive(Clone)]
pub struct SessionPoller {
    shared: Arc<PollerShared>,
}

impl SessionPoller {
    /// Creates an idle poller. `interval` is clamped to 1s..=60s.
    pub fn new(source: Arc<dyn SessionSource>, user_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                source,
                user_id: user_id.into(),
                state: Mutex::new(PollerState {
                    running: false,
                    interval: clamp_interval(interval),
                    in_error_state: false,
                    last_error_time: None,
                    observer: None,
                    stop_token: None,
                    stream: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    /// Starts polling and returns the emission stream.
    ///
    /// While running, further calls hand back the same stream. The loop
    /// fetches once immediately, then once per interval, and ends on
    /// [`SessionPoller::stop`] or when `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> SessionStream {
        let mut state = self.shared.lock_state();
        if state.running {
            if let Some(stream) = &state.stream {
                return stream.clone();
            }
        }

        let (tx, rx) = mpsc::channel(EMISSION_BUFFER);
        let stream = SessionStream::new(rx);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                log_error!("cannot start session poller outside a tokio runtime: {err}");
                // tx is dropped here, so the returned stream is already closed.
                return stream;
            }
        };

        let stop_token = CancellationToken::new();
        state.generation = state.generation.wrapping_add(1);
        state.running = true;
        state.stop_token = Some(stop_token.clone());
        state.stream = Some(stream.clone());
        let generation = state.generation;
        let interval = state.interval;
        drop(state);

        log_info!(
            "session polling started: user={}, interval={:?}",
            self.shared.user_id,
            interval
        );

        runtime.spawn(poll_loop(
            Arc::clone(&self.shared),
            generation,
            tx,
            cancel,
            stop_token,
        ));

        stream
    }

    /// Stops the polling loop. Safe to call repeatedly or when idle.
    pub fn stop(&self) {
        let mut state = self.shared.lock_state();
        if !state.running {
            return;
        }
        state.running = false;
        if let Some(token) = state.stop_token.take() {
            token.cancel();
        }
    }

    /// Updates the interval (clamped); a running loop re-arms on its next tick.
    pub fn set_interval(&self, interval: Duration) {
        self.shared.lock_state().interval = clamp_interval(interval);
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    pub fn set_error_callbacks(&self, observer: Arc<dyn PollerObserver>) {
        self.shared.lock_state().observer = Some(observer);
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    pub fn is_in_error_state(&self) -> bool {
        self.shared.lock_state().in_error_state
    }

    pub fn last_error_time(&self) -> Option<DateTime<Utc>> {
        self.shared.lock_state().last_error_time
    }
}
