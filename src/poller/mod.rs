pub mod change;
pub mod controller;
mod loop_worker;

pub use change::session_changed;
pub use controller::{
    clamp_interval, PollerObserver, SessionPoller, SessionSource, SessionStream, SessionUpdate,
    DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
