use std::borrow::Cow;
use std::time::Duration;

use anyhow::{bail, Result};

/// Default reconnect spacing: 5s, 10s, 30s, then 60s forever.
pub static DEFAULT_BACKOFF: BackoffSchedule = BackoffSchedule::from_static(&[
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
]);

/// Fixed, ordered wait durations between retry attempts.
///
/// The last step repeats indefinitely once the attempt counter runs past
/// the end of the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Cow<'static, [Duration]>,
}

impl BackoffSchedule {
    /// Schedule over a static sequence. `steps` must not be empty.
    pub const fn from_static(steps: &'static [Duration]) -> Self {
        Self {
            steps: Cow::Borrowed(steps),
        }
    }

    pub fn new(steps: Vec<Duration>) -> Result<Self> {
        if steps.is_empty() {
            bail!("backoff schedule needs at least one step");
        }
        Ok(Self {
            steps: Cow::Owned(steps),
        })
    }

    /// Wait before attempt `attempt` (0-indexed), saturating at the last step.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.steps.len().saturating_sub(1);
        let index = (attempt as usize).min(last);
        self.steps.get(index).copied().unwrap_or_default()
    }

    /// True once `attempt` has reached the final (maximum) step.
    pub fn is_max_interval(&self, attempt: u32) -> bool {
        attempt as usize >= self.steps.len().saturating_sub(1)
    }

    pub fn max_delay(&self) -> Duration {
        self.steps.last().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        DEFAULT_BACKOFF.clone()
    }
}
