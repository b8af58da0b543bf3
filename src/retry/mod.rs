//! Generic reconnect helper with a fixed backoff schedule.
//!
//! One [`RetryManager`] per external dependency. It knows nothing about
//! what it retries: the owner supplies a [`RetryAction`] and a
//! [`RetryStateObserver`] through `set_callbacks`.

pub mod manager;
pub mod schedule;
pub mod state;

pub use manager::{RetryAction, RetryManager, RetryStateObserver};
pub use schedule::{BackoffSchedule, DEFAULT_BACKOFF};
pub use state::RetryState;
