//! Wires the session poller, both retry managers and the presence client
//! together, publishing everything as [`MonitorEvent`]s.

mod events;

pub use events::{MonitorEvent, PlexConnectionStatus};

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::{
    error_code, is_retryable, sanitize_for_logging, AppError, ErrorCode,
};
use crate::models::MusicSession;
use crate::poller::{PollerObserver, SessionPoller, SessionSource, SessionStream};
use crate::presence::{
    build_activity, effective_client_id, validate_client_id, PresenceClient, PresenceData,
};
use crate::retry::{RetryAction, RetryManager, RetryState, RetryStateObserver};
use crate::settings::SettingsStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

struct ActivePoller {
    poller: SessionPoller,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PollingSlot {
    /// Set by a user start, cleared by a user stop. Retries only resume
    /// polling while it is set.
    requested: bool,
    active: Option<ActivePoller>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOrigin {
    User,
    Retry,
}

struct MonitorInner {
    source: Arc<dyn SessionSource>,
    presence: Arc<dyn PresenceClient>,
    settings: Arc<SettingsStore>,
    plex_retry: RetryManager,
    discord_retry: RetryManager,
    polling: Mutex<PollingSlot>,
    current_session: RwLock<Option<MusicSession>>,
    /// Serializes presence client calls.
    presence_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorInner {
    fn lock_polling(&self) -> MutexGuard<'_, PollingSlot> {
        match self.polling.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_current_session(&self, session: Option<MusicSession>) {
        match self.current_session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn current_session(&self) -> Option<MusicSession> {
        match self.current_session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn emit(&self, event: MonitorEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            log_debug!("no subscribers for {name}");
        }
    }

    fn start_polling(self: &Arc<Self>, origin: StartOrigin) -> Result<()> {
        let mut polling = self.lock_polling();
        if origin == StartOrigin::Retry && !polling.requested {
            log_info!("polling was stopped, reconnect will not resume it");
            return Ok(());
        }
        if let Some(active) = polling.active.as_ref() {
            if active.poller.is_running() {
                log_info!("session polling already running");
                return Ok(());
            }
        }

        let settings = self.settings.snapshot();
        if settings.server_url.trim().is_empty() {
            return Err(AppError::new(ErrorCode::ConfigReadFailed, "plex server URL not configured").into());
        }
        if settings.selected_plex_user_id.trim().is_empty() {
            return Err(AppError::new(ErrorCode::ConfigReadFailed, "plex user not selected").into());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .context("session polling needs a tokio runtime")?;

        if let Some(stale) = polling.active.take() {
            stale.cancel.cancel();
            stale.poller.stop();
        }

        let poller = SessionPoller::new(
            Arc::clone(&self.source),
            settings.selected_plex_user_id.clone(),
            settings.polling_interval(),
        );
        poller.set_error_callbacks(Arc::new(PlexLinkObserver {
            monitor: Arc::downgrade(self),
        }));

        let cancel = CancellationToken::new();
        let stream = poller.start(cancel.clone());
        runtime.spawn(consume_sessions(Arc::downgrade(self), stream));

        polling.active = Some(ActivePoller { poller, cancel });
        polling.requested = true;
        Ok(())
    }

    fn stop_polling(&self) {
        let active = {
            let mut polling = self.lock_polling();
            polling.requested = false;
            polling.active.take()
        };
        if let Some(active) = active {
            active.cancel.cancel();
            active.poller.stop();
            log_info!("session polling stopped");
        }
    }

    fn start_plex_retry(&self, err: &anyhow::Error, code: Option<ErrorCode>) {
        match code {
            Some(code) if code.is_auth_error() => {
                log_warn!("plex error {code} needs re-authentication, not retrying");
            }
            Some(code) if !is_retryable(code) => {
                log_warn!("plex error {code} is not retryable");
            }
            _ => self.plex_retry.start(err, code),
        }
    }

    async fn handle_update(&self, update: Option<MusicSession>, had_session: &mut bool) {
        match update {
            Some(session) => {
                log_info!("playback detected: {} - {}", session.track, session.artist);
                self.set_current_session(Some(session.clone()));
                self.push_presence(&session).await;
                self.emit(MonitorEvent::PlaybackUpdated(session));
                *had_session = true;
            }
            None if *had_session => {
                log_info!("playback stopped");
                self.set_current_session(None);
                self.clear_presence().await;
                self.emit(MonitorEvent::PlaybackStopped);
                *had_session = false;
            }
            None => {}
        }
    }

    async fn push_presence(&self, session: &MusicSession) {
        let _gate = self.presence_gate.lock().await;

        if !self.presence.is_connected() {
            self.reconnect_presence_silently().await;
            if !self.presence.is_connected() {
                return;
            }
            log_info!("presence client reconnected, restoring activity");
        }

        let activity = build_activity(&PresenceData::from_session(session, Utc::now()));
        if let Err(err) = self.presence.set_activity(activity).await {
            log_warn!("failed to update presence: {}", sanitize_for_logging(&format!("{err:#}")));
        }
    }

    /// Caller holds `presence_gate`. Failures only log at debug level.
    async fn reconnect_presence_silently(&self) {
        let configured = self.settings.snapshot().discord_client_id;
        match self.presence.connect(effective_client_id(&configured)).await {
            Ok(()) => {
                self.record_discord_connected();
                log_info!("auto-reconnected presence client");
            }
            Err(err) => log_debug!("presence reconnect failed: {err:#}"),
        }
    }

    async fn clear_presence(&self) {
        let _gate = self.presence_gate.lock().await;
        if !self.presence.is_connected() {
            return;
        }
        if let Err(err) = self.presence.clear().await {
            log_warn!("failed to clear presence: {err:#}");
        }
    }

    fn spawn_clear_presence(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(self);
                runtime.spawn(async move { inner.clear_presence().await });
            }
            Err(err) => log_error!("cannot clear presence outside a tokio runtime: {err}"),
        }
    }

    /// Connects the presence client. An empty `client_id` means the
    /// configured id, falling back to the default application.
    async fn connect_presence(&self, client_id: &str) -> Result<()> {
        let configured = self.settings.snapshot().discord_client_id;
        let requested = if client_id.is_empty() {
            configured.clone()
        } else {
            client_id.to_string()
        };
        validate_client_id(&requested)?;
        let effective = effective_client_id(&requested).to_string();

        log_info!("connecting presence client...");
        let result = {
            let _gate = self.presence_gate.lock().await;
            self.presence.connect(&effective).await
        };

        if let Err(err) = result {
            log_error!("presence connection failed: {}", sanitize_for_logging(&format!("{err:#}")));
            self.emit(MonitorEvent::DiscordDisconnected {
                error: Some(format!("{err:#}")),
                code: error_code(&err),
            });
            return Err(err);
        }

        if !requested.is_empty() && requested != configured {
            if let Err(err) = self
                .settings
                .update(|settings| settings.discord_client_id = requested.clone())
            {
                log_warn!("failed to save presence client id: {err:#}");
            }
        }

        self.record_discord_connected();
        self.discord_retry.reset();
        self.emit(MonitorEvent::DiscordConnected { client_id: effective });
        log_info!("presence client connected");
        Ok(())
    }

    fn record_plex_connected(&self) {
        if let Err(err) = self.settings.record_plex_connected(Utc::now()) {
            log_warn!("failed to save plex connection time: {err:#}");
        }
    }

    fn record_discord_connected(&self) {
        if let Err(err) = self.settings.record_discord_connected(Utc::now()) {
            log_warn!("failed to save presence connection time: {err:#}");
        }
    }
}

async fn consume_sessions(monitor: Weak<MonitorInner>, stream: SessionStream) {
    let mut had_session = false;
    while let Some(update) = stream.recv().await {
        let Some(inner) = monitor.upgrade() else {
            break;
        };
        inner.handle_update(update, &mut had_session).await;
    }
    log_debug!("session update consumer exited");
}

struct PlexLinkObserver {
    monitor: Weak<MonitorInner>,
}

impl PollerObserver for PlexLinkObserver {
    fn on_error(&self, err: &anyhow::Error) {
        let Some(inner) = self.monitor.upgrade() else {
            return;
        };
        log_warn!("plex connection error detected, starting recovery");

        let code = error_code(err);
        inner.spawn_clear_presence();
        inner.emit(MonitorEvent::PlexConnectionError {
            error: format!("{err:#}"),
            code,
        });
        inner.start_plex_retry(err, code);
    }

    fn on_recovered(&self) {
        let Some(inner) = self.monitor.upgrade() else {
            return;
        };
        log_info!("plex connection recovered");

        inner.plex_retry.reset();
        inner.record_plex_connected();
        inner.emit(MonitorEvent::PlexConnectionRestored);
    }
}

/// Checks the server once, then makes sure polling is running again.
struct PlexReconnect {
    monitor: Weak<MonitorInner>,
}

#[async_trait]
impl RetryAction for PlexReconnect {
    async fn attempt(&self) -> Result<()> {
        let inner = self
            .monitor
            .upgrade()
            .ok_or_else(|| anyhow!("playback monitor is gone"))?;

        let user_id = inner.settings.snapshot().selected_plex_user_id;
        inner
            .source
            .fetch_sessions(&user_id)
            .await
            .context("checking plex server")?;
        inner.record_plex_connected();
        inner.start_polling(StartOrigin::Retry)
    }
}

struct DiscordReconnect {
    monitor: Weak<MonitorInner>,
}

#[async_trait]
impl RetryAction for DiscordReconnect {
    async fn attempt(&self) -> Result<()> {
        let inner = self
            .monitor
            .upgrade()
            .ok_or_else(|| anyhow!("playback monitor is gone"))?;
        inner.connect_presence("").await
    }
}

fn retry_events(
    monitor: &Weak<MonitorInner>,
    wrap: fn(RetryState) -> MonitorEvent,
) -> Arc<dyn RetryStateObserver> {
    let monitor = monitor.clone();
    Arc::new(move |state: &RetryState| {
        if let Some(inner) = monitor.upgrade() {
            inner.emit(wrap(state.clone()));
        }
    })
}

/// Keeps the presence in sync with what the monitored user is playing and
/// recovers both connections when they drop.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct PlaybackMonitor {
    inner: Arc<MonitorInner>,
}

impl PlaybackMonitor {
    pub fn new(
        source: Arc<dyn SessionSource>,
        presence: Arc<dyn PresenceClient>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new_cyclic(|monitor: &Weak<MonitorInner>| {
            let plex_retry = RetryManager::new("Plex");
            plex_retry.set_callbacks(
                Arc::new(PlexReconnect {
                    monitor: monitor.clone(),
                }),
                retry_events(monitor, MonitorEvent::PlexRetryState),
            );

            let discord_retry = RetryManager::new("Discord");
            discord_retry.set_callbacks(
                Arc::new(DiscordReconnect {
                    monitor: monitor.clone(),
                }),
                retry_events(monitor, MonitorEvent::DiscordRetryState),
            );

            MonitorInner {
                source,
                presence,
                settings,
                plex_retry,
                discord_retry,
                polling: Mutex::new(PollingSlot::default()),
                current_session: RwLock::new(None),
                presence_gate: tokio::sync::Mutex::new(()),
                events,
            }
        });

        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Starts polling the configured server for the selected user.
    ///
    /// Fails with `ConfigReadFailed` when either is missing. A no-op while
    /// polling is already running.
    pub fn start_polling(&self) -> Result<()> {
        self.inner.start_polling(StartOrigin::User)
    }

    /// Stops polling and any pending Plex retry. Safe when idle.
    pub fn stop_polling(&self) {
        self.inner.plex_retry.stop();
        self.inner.stop_polling();
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .lock_polling()
            .active
            .as_ref()
            .is_some_and(|active| active.poller.is_running())
    }

    pub fn connection_status(&self) -> PlexConnectionStatus {
        let settings = self.inner.settings.snapshot();
        let mut status = PlexConnectionStatus {
            server_url: settings.server_url,
            user_id: settings.selected_plex_user_id,
            user_name: settings.selected_plex_user_name,
            ..PlexConnectionStatus::default()
        };

        if let Some(active) = self.inner.lock_polling().active.as_ref() {
            status.polling = active.poller.is_running();
            status.in_error_state = active.poller.is_in_error_state();
            status.connected = status.polling && !status.in_error_state;
        }

        status
    }

    /// Persists the interval (clamped to 1..=60s) and applies it to a running
    /// poller from its next tick. Returns the seconds actually stored.
    pub fn set_polling_interval(&self, secs: u64) -> Result<u64> {
        let stored = self.inner.settings.set_polling_interval(secs)?;

        if let Some(active) = self.inner.lock_polling().active.as_ref() {
            if active.poller.is_running() {
                active.poller.set_interval(Duration::from_secs(stored));
                log_info!("polling interval updated to {stored}s");
            }
        }

        Ok(stored)
    }

    pub fn polling_interval(&self) -> Duration {
        self.inner.settings.snapshot().polling_interval()
    }

    pub fn current_session(&self) -> Option<MusicSession> {
        self.inner.current_session()
    }

    pub fn plex_retry_state(&self) -> RetryState {
        self.inner.plex_retry.state()
    }

    pub fn discord_retry_state(&self) -> RetryState {
        self.inner.discord_retry.state()
    }

    pub fn retry_plex(&self) {
        self.inner.plex_retry.manual_retry();
    }

    pub fn retry_discord(&self) {
        self.inner.discord_retry.manual_retry();
    }

    /// Connects the presence client. Empty `client_id` uses the configured
    /// id or the default; a recoverable failure starts the Discord retry.
    pub async fn connect_discord(&self, client_id: &str) -> Result<()> {
        let result = self.inner.connect_presence(client_id).await;
        if let Err(err) = &result {
            let code = error_code(err);
            if code.map_or(true, is_retryable) {
                self.inner.discord_retry.start(err, code);
            }
        }
        result
    }

    /// Stops polling and both retry cycles.
    pub fn shutdown(&self) {
        self.stop_polling();
        self.inner.discord_retry.stop();
        log_info!("playback monitor shut down");
    }
}
