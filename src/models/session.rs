use serde::{Deserialize, Serialize};

pub const FALLBACK_TRACK_TITLE: &str = "Unknown Track";
pub const FALLBACK_ARTIST: &str = "Unknown Artist";
pub const FALLBACK_ALBUM: &str = "Unknown Album";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

impl PlaybackState {
    /// Parses the player state attribute reported by the media server.
    /// Anything unrecognised is treated as stopped.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "playing" => PlaybackState::Playing,
            "paused" => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

/// One observed instant of music playback for the monitored user.
///
/// Produced by a [`crate::poller::SessionSource`] on every successful fetch
/// and never mutated afterwards; "nothing playing" is `None` at the use site.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MusicSession {
    pub session_key: String,
    pub user_id: String,
    pub user_name: String,
    /// "track", "episode", "movie" or "photo".
    pub media_type: String,
    pub state: PlaybackState,
    pub player_name: String,
    pub track: String,
    pub artist: String,
    pub album: String,
    /// Artwork path relative to the server.
    pub thumb: String,
    /// Absolute artwork URL, server address and token included.
    pub thumb_url: String,
    pub duration_ms: u64,
    pub view_offset_ms: u64,
}

impl MusicSession {
    /// Fills empty track, artist and album with displayable placeholders.
    pub fn apply_fallbacks(&mut self) {
        if self.track.is_empty() {
            self.track = FALLBACK_TRACK_TITLE.to_string();
        }
        if self.artist.is_empty() {
            self.artist = FALLBACK_ARTIST.to_string();
        }
        if self.album.is_empty() {
            self.album = FALLBACK_ALBUM.to_string();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}
