use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::PayloadError;
use crate::timer::TimerSlot;
use crate::types::MediaInfo;

/// Quiet period before a "no session" report clears the overlay
pub const CLEAR_DELAY: Duration = Duration::from_millis(2000);

const LOG_PREVIEW_CHARS: usize = 50;

/// Wire shape of a media-info message. Every field may be missing or null.
#[derive(Debug, Deserialize)]
struct RawMediaPayload {
    title: Option<String>,
    artist: Option<String>,
    album_art_base64: Option<String>,
    album_art_avg: Option<String>,
}

/// Parse one inbound frame. `Ok(None)` means the frame carried no data.
pub fn parse_payload(raw: &str) -> Result<Option<MediaInfo>, PayloadError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let payload: Option<RawMediaPayload> = serde_json::from_str(raw)?;
    Ok(payload.map(|p| MediaInfo {
        title: p.title.unwrap_or_default(),
        artist: p.artist.unwrap_or_default(),
        album_art_image: p.album_art_base64,
        album_art_average_color: p.album_art_avg,
    }))
}

fn preview(raw: &str) -> String {
    raw.chars().take(LOG_PREVIEW_CHARS).collect()
}

/// Turns media-info messages into the current `MediaInfo`, debouncing clears
#[derive(Debug, Default)]
pub struct MediaSessionTracker {
    current: Option<MediaInfo>,
    clear: TimerSlot<()>,
    torn_down: bool,
}

impl MediaSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&MediaInfo> {
        self.current.as_ref()
    }

    pub fn clear_pending(&self) -> bool {
        self.clear.is_pending()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.clear.deadline()
    }

    /// Apply an inbound frame. Returns true when the current media changed.
    pub fn on_message(&mut self, raw: &str, now: Instant) -> bool {
        if self.torn_down {
            return false;
        }

        log::debug!("Media message: {}...", preview(raw));

        let parsed = match parse_payload(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("Dropping malformed media message: {}", e);
                None
            }
        };

        self.clear.cancel();

        match parsed.filter(MediaInfo::has_session) {
            Some(info) => {
                let changed = self.current.as_ref() != Some(&info);
                self.current = Some(info);
                changed
            }
            None => {
                self.clear.schedule(now, CLEAR_DELAY, ());
                false
            }
        }
    }

    /// Apply the pending clear if it is due. Returns true when media was cleared.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.torn_down || self.clear.fire(now).is_none() {
            return false;
        }
        if self.current.take().is_some() {
            log::info!("No active media session");
            true
        } else {
            false
        }
    }

    pub fn teardown(&mut self) {
        self.clear.cancel();
        self.torn_down = true;
    }
}
