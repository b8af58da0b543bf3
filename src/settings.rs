use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::errors::{AppError, ErrorCode};
use crate::poller::{DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = DEFAULT_POLL_INTERVAL.as_secs();
pub const MIN_POLLING_INTERVAL_SECS: u64 = MIN_POLL_INTERVAL.as_secs();
pub const MAX_POLLING_INTERVAL_SECS: u64 = MAX_POLL_INTERVAL.as_secs();

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub server_url: String,
    pub discord_client_id: String,
    pub selected_plex_user_id: String,
    pub selected_plex_user_name: String,
    pub polling_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plex_last_connected: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_last_connected: Option<DateTime<Utc>>,
    pub setup_completed: bool,
    pub setup_skipped: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            discord_client_id: String::new(),
            selected_plex_user_id: String::new(),
            selected_plex_user_name: String::new(),
            polling_interval_secs: DEFAULT_POLLING_INTERVAL_SECS,
            plex_last_connected: None,
            discord_last_connected: None,
            setup_completed: false,
            setup_skipped: false,
        }
    }
}

impl Settings {
    /// Configured poll spacing, or the poller default when unset.
    pub fn polling_interval(&self) -> Duration {
        if self.polling_interval_secs < MIN_POLLING_INTERVAL_SECS {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_secs(self.polling_interval_secs)
        }
    }
}

/// JSON-file backed settings, cached in memory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads `path`. A missing file yields defaults, as does a malformed one
    /// (with a warning) so a bad edit never blocks startup.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = read_file(&path)?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log_warn!("settings at {} are malformed, using defaults: {err}", path.display());
                    Settings::default()
                }
            }
        } else {
            log_info!("no settings at {}, using defaults", path.display());
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    /// Applies `change` and persists. The in-memory copy is rolled back if
    /// the write fails.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.write();
        let mut next = guard.clone();
        change(&mut next);
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    /// Stores the poll interval clamped to 1..=60 seconds and returns the
    /// value actually saved.
    pub fn set_polling_interval(&self, secs: u64) -> Result<u64> {
        let clamped = secs.clamp(MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS);
        if clamped != secs {
            log_warn!("polling interval {secs}s out of range, using {clamped}s");
        }
        self.update(|settings| settings.polling_interval_secs = clamped)?;
        Ok(clamped)
    }

    pub fn record_plex_connected(&self, now: DateTime<Utc>) -> Result<()> {
        self.update(|settings| settings.plex_last_connected = Some(now))
            .map(|_| ())
    }

    pub fn record_discord_connected(&self, now: DateTime<Utc>) -> Result<()> {
        self.update(|settings| settings.discord_last_connected = Some(now))
            .map(|_| ())
    }

    pub fn is_setup_complete(&self) -> bool {
        let settings = self.read();
        settings.setup_completed || settings.setup_skipped
    }

    pub fn reload(&self) -> Result<()> {
        let contents = read_file(&self.path)?;
        let data: Settings = serde_json::from_str(&contents).map_err(|err| {
            AppError::wrap(err, ErrorCode::ConfigReadFailed, "settings file is malformed")
        })?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| {
                        AppError::wrap(err, ErrorCode::ConfigWriteFailed, "failed to create settings directory")
                    })
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        fs::write(&self.path, serialized)
            .map_err(|err| AppError::wrap(err, ErrorCode::ConfigWriteFailed, "failed to write settings"))
            .with_context(|| format!("writing {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|err| AppError::wrap(err, ErrorCode::ConfigReadFailed, "failed to read settings"))
        .with_context(|| format!("reading {}", path.display()))
}
