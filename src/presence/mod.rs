//! Rich presence mapping and the presence client contract.
//!
//! The IPC client itself lives outside this crate; the monitor only needs
//! something implementing [`PresenceClient`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorCode};
use crate::models::{MusicSession, PlaybackState};

/// Public application id used when the user has not configured their own.
pub const DEFAULT_CLIENT_ID: &str = "1463211692656689172";

/// Snowflake ids are at least this many digits.
const MIN_CLIENT_ID_LEN: usize = 17;

const LARGE_IMAGE: &str = "plex";
const LARGE_TEXT: &str = "Plex Music";

/// What the presence should show for the current track.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub track: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: String,
    pub state: PlaybackState,
    pub duration_ms: u64,
    pub position_ms: u64,
}

impl PresenceData {
    /// Start time is backdated by the playback position so the elapsed
    /// counter matches the player.
    pub fn from_session(session: &MusicSession, now: DateTime<Utc>) -> Self {
        let offset = i64::try_from(session.view_offset_ms).unwrap_or(i64::MAX);
        let start_time = now
            .checked_sub_signed(ChronoDuration::milliseconds(offset))
            .unwrap_or(now);

        Self {
            start_time: Some(start_time),
            track: session.track.clone(),
            artist: session.artist.clone(),
            album: session.album.clone(),
            artwork_url: session.thumb_url.clone(),
            state: session.state,
            duration_ms: session.duration_ms,
            position_ms: session.view_offset_ms,
        }
    }
}

/// Activity payload handed to the presence client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
}

pub fn build_activity(data: &PresenceData) -> Activity {
    let paused = data.state == PlaybackState::Paused;

    let state = match (data.artist.is_empty(), data.album.is_empty()) {
        (false, false) => Some(format!("by {} • {}", data.artist, data.album)),
        (false, true) => Some(format!("by {}", data.artist)),
        (true, _) if paused => Some("Paused".to_string()),
        (true, _) if data.state == PlaybackState::Playing => Some("Playing on Plex".to_string()),
        (true, _) => None,
    };

    let start_timestamp = match data.state {
        PlaybackState::Playing => data.start_time,
        _ => None,
    };

    let (small_image, small_text) = if paused {
        ("pause", "Paused")
    } else {
        ("play", "Playing")
    };

    Activity {
        details: data.track.clone(),
        state,
        start_timestamp,
        large_image: LARGE_IMAGE.to_string(),
        large_text: LARGE_TEXT.to_string(),
        small_image: small_image.to_string(),
        small_text: small_text.to_string(),
    }
}

/// Checks a user-supplied application id. Empty means "use the default".
pub fn validate_client_id(client_id: &str) -> Result<(), AppError> {
    if client_id.is_empty() {
        return Ok(());
    }

    if client_id.len() < MIN_CLIENT_ID_LEN {
        return Err(AppError::new(
            ErrorCode::DiscordClientIdInvalid,
            format!("Discord Client ID must be at least {MIN_CLIENT_ID_LEN} digits"),
        ));
    }

    if !client_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::new(
            ErrorCode::DiscordClientIdInvalid,
            "Discord Client ID must contain only numbers",
        ));
    }

    Ok(())
}

/// Configured id, or [`DEFAULT_CLIENT_ID`] when none is set.
pub fn effective_client_id(configured: &str) -> &str {
    if configured.trim().is_empty() {
        DEFAULT_CLIENT_ID
    } else {
        configured
    }
}

/// Maps a raw IPC failure message to a coded error.
pub fn classify_connect_error(message: &str) -> AppError {
    let lower = message.to_ascii_lowercase();

    if ["connection refused", "no such file", "pipe"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return AppError::new(ErrorCode::DiscordNotRunning, "Discord is not running");
    }

    if lower.contains("invalid") {
        return AppError::new(ErrorCode::DiscordClientIdInvalid, "invalid Discord Client ID");
    }

    AppError::wrap(message, ErrorCode::DiscordConnFailed, "Discord connection failed")
}

/// True when an activity update failed because the IPC socket went away.
pub fn is_connection_lost(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("broken pipe") || lower.contains("connection reset") || lower.contains("eof")
}

/// Local rich presence IPC client.
#[async_trait]
pub trait PresenceClient: Send + Sync {
    /// Connects with `client_id`. Reconnecting with the same id is a no-op.
    async fn connect(&self, client_id: &str) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn set_activity(&self, activity: Activity) -> Result<()>;

    /// Removes the current activity. A disconnected client has nothing to clear.
    async fn clear(&self) -> Result<()>;
}
