pub mod session;

pub use session::{MusicSession, PlaybackState};
