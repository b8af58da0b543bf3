use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, ErrorCode};

use super::change::session_changed;
use super::controller::{PollerShared, SessionUpdate};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Upper bound on a single fetch, on top of the source's own timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    StopRequested,
}

enum LoopState {
    Polling,
    Stopping(StopReason),
}

enum PollOutcome {
    Fetched(SessionUpdate),
    Interrupted(StopReason),
}

/// Clears the running flag and closes the stream when the loop task ends,
/// including on panic inside the session source.
struct RunGuard {
    shared: Arc<PollerShared>,
    generation: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.finish_run(self.generation);
    }
}

pub(super) async fn poll_loop(
    shared: Arc<PollerShared>,
    generation: u64,
    tx: mpsc::Sender<SessionUpdate>,
    cancel: CancellationToken,
    stop: CancellationToken,
) {
    let _guard = RunGuard {
        shared: Arc::clone(&shared),
        generation,
    };

    let mut period = shared.interval();
    let mut ticker = new_ticker(period);
    let mut last_session: SessionUpdate = None;

    let mut state = match poll_once(&shared, &cancel, &stop).await {
        PollOutcome::Fetched(session) => {
            if session.is_some() {
                emit(&tx, session.clone());
            }
            last_session = session;
            LoopState::Polling
        }
        PollOutcome::Interrupted(reason) => LoopState::Stopping(reason),
    };

    loop {
        match state {
            LoopState::Polling => {
                state = tokio::select! {
                    _ = cancel.cancelled() => LoopState::Stopping(StopReason::Cancelled),
                    _ = stop.cancelled() => LoopState::Stopping(StopReason::StopRequested),
                    _ = ticker.tick() => {
                        let current = shared.interval();
                        if current != period {
                            period = current;
                            ticker = new_ticker(period);
                            log_info!("poller interval changed to {:?}", period);
                        }

                        match poll_once(&shared, &cancel, &stop).await {
                            PollOutcome::Fetched(session) => {
                                if session_changed(last_session.as_ref(), session.as_ref()) {
                                    emit(&tx, session.clone());
                                    last_session = session;
                                }
                                LoopState::Polling
                            }
                            PollOutcome::Interrupted(reason) => LoopState::Stopping(reason),
                        }
                    }
                };
            }
            LoopState::Stopping(reason) => {
                match reason {
                    StopReason::Cancelled => log_info!("poller stopped: context cancelled"),
                    StopReason::StopRequested => log_info!("poller stopped: stop requested"),
                }
                break;
            }
        }
    }

    // Dropping the sender closes the stream for every consumer.
    drop(tx);
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// One fetch, raced against cancellation so a late result is discarded.
async fn poll_once(
    shared: &PollerShared,
    cancel: &CancellationToken,
    stop: &CancellationToken,
) -> PollOutcome {
    let fetch = time::timeout(FETCH_TIMEOUT, shared.source.fetch_sessions(&shared.user_id));

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return PollOutcome::Interrupted(StopReason::Cancelled),
        _ = stop.cancelled() => return PollOutcome::Interrupted(StopReason::StopRequested),
        result = fetch => result,
    };

    let result = result.unwrap_or_else(|_| {
        Err(AppError::new(
            ErrorCode::Timeout,
            format!("session fetch exceeded {}s", FETCH_TIMEOUT.as_secs()),
        )
        .into())
    });

    match result {
        Ok(sessions) => {
            shared.record_success();
            PollOutcome::Fetched(sessions.into_iter().next())
        }
        Err(err) => {
            shared.record_failure(&err);
            PollOutcome::Fetched(None)
        }
    }
}

fn emit(tx: &mpsc::Sender<SessionUpdate>, update: SessionUpdate) {
    match tx.try_send(update) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            log_debug!("session stream full, skipping update");
        }
        Err(TrySendError::Closed(_)) => {
            log_debug!("session stream has no receiver, skipping update");
        }
    }
}
