use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable failure classification carried by [`super::AppError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Media server is offline or not answering.
    PlexUnreachable,
    /// Token rejected or expired.
    PlexAuthFailed,
    /// Generic media server failure (unexpected status, bad payload).
    PlexConnFailed,
    Timeout,
    DiscordNotRunning,
    DiscordConnFailed,
    DiscordClientIdInvalid,
    ConfigReadFailed,
    ConfigWriteFailed,
    KeychainUnavailable,
    KeychainStoreFailed,
    KeychainReadFailed,
    EncryptionFailed,
    DecryptionFailed,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PlexUnreachable => "PLEX_UNREACHABLE",
            ErrorCode::PlexAuthFailed => "PLEX_AUTH_FAILED",
            ErrorCode::PlexConnFailed => "PLEX_CONN_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::DiscordNotRunning => "DISCORD_NOT_RUNNING",
            ErrorCode::DiscordConnFailed => "DISCORD_CONN_FAILED",
            ErrorCode::DiscordClientIdInvalid => "DISCORD_CLIENT_ID_INVALID",
            ErrorCode::ConfigReadFailed => "CONFIG_READ_FAILED",
            ErrorCode::ConfigWriteFailed => "CONFIG_WRITE_FAILED",
            ErrorCode::KeychainUnavailable => "KEYCHAIN_UNAVAILABLE",
            ErrorCode::KeychainStoreFailed => "KEYCHAIN_STORE_FAILED",
            ErrorCode::KeychainReadFailed => "KEYCHAIN_READ_FAILED",
            ErrorCode::EncryptionFailed => "ENCRYPTION_FAILED",
            ErrorCode::DecryptionFailed => "DECRYPTION_FAILED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Failures that need the user to re-authenticate rather than wait.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::PlexAuthFailed | ErrorCode::KeychainReadFailed | ErrorCode::DecryptionFailed
        )
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::PlexUnreachable
                | ErrorCode::PlexConnFailed
                | ErrorCode::Timeout
                | ErrorCode::DiscordNotRunning
                | ErrorCode::DiscordConnFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
