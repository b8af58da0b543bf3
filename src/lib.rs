//! Background engine that mirrors a Plex user's music playback into a
//! Discord rich presence.
//!
//! [`poller::SessionPoller`] watches the media server, [`retry::RetryManager`]
//! brings dropped connections back, and [`monitor::PlaybackMonitor`] ties
//! them to a [`presence::PresenceClient`] and the persisted
//! [`settings::SettingsStore`].

pub mod errors;
pub mod models;
pub mod monitor;
pub mod poller;
pub mod presence;
pub mod retry;
pub mod settings;
pub mod utils;

pub use errors::{AppError, ErrorCode};
pub use models::{MusicSession, PlaybackState};
pub use monitor::{MonitorEvent, PlaybackMonitor, PlexConnectionStatus};
pub use poller::{PollerObserver, SessionPoller, SessionSource, SessionStream};
pub use presence::{Activity, PresenceClient, PresenceData};
pub use retry::{BackoffSchedule, RetryAction, RetryManager, RetryState, RetryStateObserver};
pub use settings::{Settings, SettingsStore};
pub use utils::init_logging;
