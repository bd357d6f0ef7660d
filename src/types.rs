/// Now playing data as received from the media-info service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub artist: String,
    pub album_art_image: Option<String>,
    pub album_art_average_color: Option<String>,
}

impl MediaInfo {
    /// A session is active when the server reports a title or an artist
    pub fn has_session(&self) -> bool {
        !self.title.is_empty() || !self.artist.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    #[default]
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn caption(self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Connecting => "trying to connect",
        }
    }
}

/// How a socket close was classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// The far end closed on purpose with a recognized code
    Graceful { code: u16, reason: String },
    /// Eligible for another attempt
    Transient { code: u16 },
    /// Too many errors since the last successful open
    Exhausted,
    /// We asked for the close ourselves
    Requested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollState {
    #[default]
    Static,
    MovingOut,
    Jumping,
    MovingIn,
}

/// Horizontal placement of the marquee content, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContentOffset {
    pub offset_pixels: f32,
    /// Linear transition length in seconds; `None` means jump
    pub transition_seconds: Option<f32>,
}

impl ContentOffset {
    pub fn rest() -> Self {
        Self::default()
    }
}
