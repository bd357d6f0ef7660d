use std::path::PathBuf;

use crate::error::ConfigError;
use crate::measure::{GlyphMeasure, MonospaceMeasure, TextMeasure};

pub const HOST_VAR: &str = "MEDIA_OVERLAY_HOST";
pub const PORT_VAR: &str = "MEDIA_OVERLAY_PORT";
pub const WIDTH_VAR: &str = "MEDIA_OVERLAY_WIDTH";
pub const FONT_VAR: &str = "MEDIA_OVERLAY_FONT";
pub const FONT_SIZE_VAR: &str = "MEDIA_OVERLAY_FONT_SIZE";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1232;
/// 250px media card minus its horizontal padding
pub const DEFAULT_CONTAINER_WIDTH: f32 = 234.0;
pub const DEFAULT_FONT_SIZE: f32 = 24.0;
pub const MEDIA_INFO_PATH: &str = "/media-info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Width available to the title, in pixels
    pub container_width: f32,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            container_width: DEFAULT_CONTAINER_WIDTH,
            font_path: None,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

fn positive_f32(var: &'static str, value: &str) -> Result<f32, ConfigError> {
    match value.trim().parse::<f32>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a positive number, got {:?}", value),
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = lookup(HOST_VAR).filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(port) = lookup(PORT_VAR) {
            config.port = match port.trim().parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: PORT_VAR,
                        reason: format!("expected a port between 1 and 65535, got {:?}", port),
                    })
                }
            };
        }

        if let Some(width) = lookup(WIDTH_VAR) {
            config.container_width = positive_f32(WIDTH_VAR, &width)?;
        }

        if let Some(size) = lookup(FONT_SIZE_VAR) {
            config.font_size = positive_f32(FONT_SIZE_VAR, &size)?;
        }

        config.font_path = lookup(FONT_VAR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, MEDIA_INFO_PATH)
    }

    /// Text measurement for the title, from the configured font if there is one
    pub fn text_measure(&self) -> Result<Box<dyn TextMeasure>, ConfigError> {
        match &self.font_path {
            Some(path) => {
                log::info!("Measuring titles with font {}", path.display());
                Ok(Box::new(GlyphMeasure::load(path, self.font_size)?))
            }
            None => {
                log::info!("No font configured, estimating title widths");
                Ok(Box::new(MonospaceMeasure::for_font_size(self.font_size)))
            }
        }
    }
}
