/// Failure reported by the socket for a single attempt. Counted, never terminal on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Inbound frame that could not be turned into media data
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid media json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("failed to read font {path}: {source}")]
    Font {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("font {path} could not be parsed")]
    FontParse { path: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("invalid data url")]
    DataUrl,

    #[error("artwork is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}
