use base64::Engine;
use std::fmt;

use crate::connection::{ConnectionEvent, ConnectionHandlers, ConnectionManager, Connector};
use crate::error::ArtworkError;
use crate::marquee::MarqueeController;
use crate::types::{ConnectionState, ContentOffset, MediaInfo, ScrollState};

pub const STATUS_LABEL: &str = "WEB SOCKET STATUS";
pub const RECONNECT_LABEL: &str = "reconnect";
pub const NO_SESSION_CAPTION: &str = "NO ACTIVE MEDIA SESSION";

/// Album art arrives as bare base64 JPEG data
pub fn thumbnail_src(info: &MediaInfo) -> String {
    match info.album_art_image.as_deref() {
        Some(data) if !data.is_empty() => format!("data:image/jpeg;base64,{}", data),
        _ => String::new(),
    }
}

/// Decode artwork bytes, accepting either bare base64 or a data URL
pub fn decode_artwork(artwork_data: &str) -> Result<Vec<u8>, ArtworkError> {
    let base64_data = if artwork_data.starts_with("data:") {
        artwork_data.split(',').nth(1).ok_or(ArtworkError::DataUrl)?
    } else {
        artwork_data
    };

    Ok(base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub caption: &'static str,
    pub reconnect_offered: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaCard {
    pub title: String,
    pub artist: String,
    pub thumbnail_src: String,
    pub artwork_bytes: Option<usize>,
    pub background_color: Option<String>,
    pub title_offset: ContentOffset,
    pub title_scroll: ScrollState,
}

/// Everything the overlay shows at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayView {
    pub status: StatusLine,
    pub media: Option<MediaCard>,
}

impl fmt::Display for OverlayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", STATUS_LABEL, self.status.caption)?;
        if let Some(reason) = self.status.reason.as_deref().filter(|r| !r.is_empty()) {
            write!(f, " ({})", reason)?;
        }
        if self.status.reconnect_offered {
            write!(f, " [{}]", RECONNECT_LABEL)?;
        }

        match &self.media {
            Some(card) => {
                write!(f, " | {} - {}", card.title, card.artist)?;
                write!(f, " @ {:.0}px", card.title_offset.offset_pixels)?;
                if let Some(seconds) = card.title_offset.transition_seconds {
                    write!(f, " over {:.1}s", seconds)?;
                }
                if let Some(bytes) = card.artwork_bytes {
                    write!(f, " | artwork {} bytes", bytes)?;
                }
                if let Some(color) = &card.background_color {
                    write!(f, " | {}", color)?;
                }
                Ok(())
            }
            None => write!(f, " | {}", NO_SESSION_CAPTION),
        }
    }
}

/// Composes connection status and tracked media into an `OverlayView`
#[derive(Debug, Default)]
pub struct DisplayCoordinator {
    state: ConnectionState,
    close_reason: Option<String>,
    artwork_bytes: Option<usize>,
}

impl DisplayCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Track the connection state. Returns true when it changed.
    pub fn apply(&mut self, event: &ConnectionEvent) -> bool {
        let Some(next) = event.state() else {
            return false;
        };
        let reason = match event {
            ConnectionEvent::Closed(close) => Some(close.reason().to_string()),
            _ => None,
        };
        let changed = next != self.state || reason != self.close_reason;
        self.state = next;
        self.close_reason = reason;
        changed
    }

    /// The reconnect affordance: only acts while closed, and always starts
    /// from a clean error count.
    pub fn reconnect<C: Connector, H: ConnectionHandlers>(
        &self,
        manager: &mut ConnectionManager<C, H>,
        handlers: H,
    ) -> bool {
        if self.state != ConnectionState::Closed {
            log::debug!("Reconnect ignored while {}", self.state.caption());
            return false;
        }
        log::info!("Reconnect requested");
        manager.connect(handlers, true);
        true
    }

    /// Decode the artwork of newly tracked media so rendering never has to
    pub fn set_media(&mut self, media: Option<&MediaInfo>) {
        self.artwork_bytes = media
            .and_then(|info| info.album_art_image.as_deref())
            .filter(|data| !data.is_empty())
            .and_then(|data| match decode_artwork(data) {
                Ok(bytes) => Some(bytes.len()),
                Err(e) => {
                    log::warn!("Unusable artwork: {}", e);
                    None
                }
            });
    }

    pub fn view(&self, media: Option<&MediaInfo>, marquee: &MarqueeController) -> OverlayView {
        let status = StatusLine {
            caption: self.state.caption(),
            reconnect_offered: self.state == ConnectionState::Closed,
            reason: self.close_reason.clone(),
        };

        let media = media.map(|info| MediaCard {
            title: info.title.clone(),
            artist: info.artist.clone(),
            thumbnail_src: thumbnail_src(info),
            artwork_bytes: self.artwork_bytes,
            background_color: info.album_art_average_color.clone(),
            title_offset: marquee.offset(),
            title_scroll: marquee.state(),
        });

        OverlayView { status, media }
    }
}
