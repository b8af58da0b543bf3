use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ErrorCode;

/// Read-only view of a [`super::RetryManager`], shaped for the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub attempt_number: u32,
    /// Milliseconds until the pending attempt fires; 0 when none is scheduled.
    pub next_retry_in_ms: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_code: Option<ErrorCode>,
    pub is_retrying: bool,
    pub max_interval_reached: bool,
}

impl RetryState {
    /// Terminal state emitted after success or an explicit reset.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn next_retry_in(&self) -> Duration {
        Duration::from_millis(self.next_retry_in_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_state_omits_error_fields() {
        let value = serde_json::to_value(RetryState::cleared()).unwrap();

        assert_eq!(value["attemptNumber"], 0);
        assert_eq!(value["isRetrying"], false);
        assert!(value.get("lastError").is_none());
        assert!(value.get("lastErrorCode").is_none());
    }

    #[test]
    fn scheduled_state_serializes_code() {
        let state = RetryState {
            attempt_number: 2,
            next_retry_in_ms: 10_000,
            last_error: Some("server offline".into()),
            last_error_code: Some(ErrorCode::PlexUnreachable),
            is_retrying: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["lastErrorCode"], "PLEX_UNREACHABLE");
        assert_eq!(value["nextRetryInMs"], 10_000);
        assert_eq!(state.next_retry_in(), Duration::from_secs(10));
    }
}
