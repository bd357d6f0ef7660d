//! Now playing overlay: a self-healing media-info socket, a debounced media
//! session tracker and a scrolling title.

pub mod app;
pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod marquee;
pub mod measure;
pub mod media;
pub mod timer;
pub mod transport;
pub mod types;

pub use app::{Command, Overlay};
pub use config::Config;
pub use connection::{ConnectionEvent, ConnectionHandlers, ConnectionManager, Connector};
pub use types::{CloseKind, ConnectionState, ContentOffset, MediaInfo, ScrollState};
