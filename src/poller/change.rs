use crate::models::MusicSession;

/// Decides whether `curr` differs from `prev` enough to notify a consumer.
///
/// Position and duration move on every poll during normal playback and are
/// never compared. Artist and album are compared because the server can
/// refresh metadata mid-track.
pub fn session_changed(prev: Option<&MusicSession>, curr: Option<&MusicSession>) -> bool {
    match (prev, curr) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(prev), Some(curr)) => {
            prev.session_key != curr.session_key
                || prev.state != curr.state
                || prev.track != curr.track
                || prev.artist != curr.artist
                || prev.album != curr.album
        }
    }
}
