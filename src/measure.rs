use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use std::path::Path;

use crate::error::ConfigError;

/// Average advance of a proportional font relative to its size, used when
/// no font file is available
pub const FALLBACK_ADVANCE_RATIO: f32 = 0.6;

/// Measures rendered text width in pixels
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> f32;
}

/// Width from the horizontal advances of a real font
pub struct GlyphMeasure {
    font: FontVec,
    scale: PxScale,
}

impl GlyphMeasure {
    pub fn load(path: &Path, size: f32) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Font {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontVec::try_from_vec(data).map_err(|_| ConfigError::FontParse {
            path: path.display().to_string(),
        })?;
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }
}

impl TextMeasure for GlyphMeasure {
    fn text_width(&self, text: &str) -> f32 {
        let scaled_font = self.font.as_scaled(self.scale);
        text.chars()
            .map(|ch| scaled_font.h_advance(self.font.glyph_id(ch)))
            .sum()
    }
}

/// Every character gets the same advance
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMeasure {
    pub advance: f32,
}

impl MonospaceMeasure {
    pub fn for_font_size(size: f32) -> Self {
        Self {
            advance: size * FALLBACK_ADVANCE_RATIO,
        }
    }
}

impl TextMeasure for MonospaceMeasure {
    fn text_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.advance
    }
}
