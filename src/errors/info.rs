use serde::Serialize;

use super::{error_code, ErrorCode};

/// User-facing description of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub title: &'static str,
    pub description: &'static str,
    pub suggestion: &'static str,
    pub retryable: bool,
}

pub fn error_info(code: ErrorCode) -> ErrorInfo {
    let (title, description, suggestion, retryable) = match code {
        ErrorCode::PlexUnreachable => (
            "Plex Server Unreachable",
            "Cannot reach Plex server. The server may be offline or there may be a network issue.",
            "Check if your Plex server is running and verify your network connection.",
            true,
        ),
        ErrorCode::PlexAuthFailed => (
            "Plex Authentication Failed",
            "Your Plex token is invalid or has expired.",
            "Please re-authenticate with Plex to get a new token.",
            false,
        ),
        ErrorCode::PlexConnFailed => (
            "Plex Connection Failed",
            "Failed to connect to Plex server.",
            "Check your server URL and network connection, then try again.",
            true,
        ),
        ErrorCode::Timeout => (
            "Connection Timeout",
            "The connection to the server timed out.",
            "The server may be slow or your network may be congested. Please try again.",
            true,
        ),
        ErrorCode::DiscordNotRunning => (
            "Discord Not Running",
            "Discord is not running on your computer.",
            "Start Discord to enable Rich Presence.",
            true,
        ),
        ErrorCode::DiscordConnFailed => (
            "Discord Connection Failed",
            "Cannot connect to Discord. The connection may have been interrupted.",
            "Try restarting Discord and PlexCord.",
            true,
        ),
        ErrorCode::DiscordClientIdInvalid => (
            "Invalid Discord Client ID",
            "The Discord Application Client ID is invalid.",
            "Check your Client ID in Discord settings or reset to default.",
            false,
        ),
        ErrorCode::ConfigReadFailed => (
            "Configuration Error",
            "Failed to read application settings.",
            "The settings file may be corrupted. Try resetting the application.",
            false,
        ),
        ErrorCode::ConfigWriteFailed => (
            "Settings Save Failed",
            "Failed to save application settings.",
            "Check that you have write permissions to the settings folder.",
            true,
        ),
        ErrorCode::KeychainUnavailable => (
            "Secure Storage Unavailable",
            "The system's secure storage is not available.",
            "PlexCord will use encrypted file storage instead.",
            false,
        ),
        ErrorCode::KeychainStoreFailed => (
            "Failed to Store Credentials",
            "Could not save your credentials securely.",
            "Check your system's keychain settings and permissions.",
            true,
        ),
        ErrorCode::KeychainReadFailed => (
            "Failed to Read Credentials",
            "Could not retrieve your saved credentials.",
            "You may need to re-enter your Plex token.",
            false,
        ),
        ErrorCode::EncryptionFailed => (
            "Encryption Failed",
            "Failed to encrypt your credentials.",
            "Check available disk space and try again.",
            true,
        ),
        ErrorCode::DecryptionFailed => (
            "Decryption Failed",
            "Failed to decrypt your saved credentials.",
            "You'll need to re-enter your Plex token.",
            false,
        ),
        ErrorCode::UnknownError => (
            "Unexpected Error",
            "An unexpected error occurred.",
            "Please try again. If the problem persists, restart PlexCord.",
            true,
        ),
    };

    ErrorInfo {
        code,
        title,
        description,
        suggestion,
        retryable,
    }
}

/// Info for an arbitrary error; errors without a code map to `UnknownError`.
pub fn error_info_for(err: &anyhow::Error) -> ErrorInfo {
    error_info(error_code(err).unwrap_or(ErrorCode::UnknownError))
}

pub fn is_retryable(code: ErrorCode) -> bool {
    error_info(code).retryable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    #[test]
    fn retryable_table_matches_error_kinds() {
        assert!(is_retryable(ErrorCode::PlexUnreachable));
        assert!(is_retryable(ErrorCode::Timeout));
        assert!(is_retryable(ErrorCode::UnknownError));
        assert!(!is_retryable(ErrorCode::PlexAuthFailed));
        assert!(!is_retryable(ErrorCode::DiscordClientIdInvalid));
        assert!(!is_retryable(ErrorCode::ConfigReadFailed));
    }

    #[test]
    fn info_for_foreign_error_is_unknown() {
        let err = anyhow::anyhow!("socket closed");
        assert_eq!(error_info_for(&err).code, ErrorCode::UnknownError);

        let err: anyhow::Error = AppError::new(ErrorCode::Timeout, "poll timed out").into();
        let info = error_info_for(&err);
        assert_eq!(info.code, ErrorCode::Timeout);
        assert_eq!(info.title, "Connection Timeout");
    }
}
