use serde::Serialize;

use crate::errors::ErrorCode;
use crate::models::MusicSession;
use crate::retry::RetryState;

/// Notifications published by [`super::PlaybackMonitor`] for the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum MonitorEvent {
    PlaybackUpdated(MusicSession),
    PlaybackStopped,
    PlexConnectionError {
        error: String,
        #[serde(rename = "errorCode")]
        code: Option<ErrorCode>,
    },
    PlexConnectionRestored,
    PlexRetryState(RetryState),
    DiscordRetryState(RetryState),
    DiscordConnected {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    DiscordDisconnected {
        error: Option<String>,
        #[serde(rename = "errorCode")]
        code: Option<ErrorCode>,
    },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::PlaybackUpdated(_) => "PlaybackUpdated",
            MonitorEvent::PlaybackStopped => "PlaybackStopped",
            MonitorEvent::PlexConnectionError { .. } => "PlexConnectionError",
            MonitorEvent::PlexConnectionRestored => "PlexConnectionRestored",
            MonitorEvent::PlexRetryState(_) => "PlexRetryState",
            MonitorEvent::DiscordRetryState(_) => "DiscordRetryState",
            MonitorEvent::DiscordConnected { .. } => "DiscordConnected",
            MonitorEvent::DiscordDisconnected { .. } => "DiscordDisconnected",
        }
    }
}

/// Snapshot of the media server link for status displays.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlexConnectionStatus {
    pub connected: bool,
    pub polling: bool,
    pub in_error_state: bool,
    pub server_url: String,
    pub user_id: String,
    pub user_name: String,
}
