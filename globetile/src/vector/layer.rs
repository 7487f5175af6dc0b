//! Vector layers and their drawing styles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default layer opacity.
pub const DEFAULT_OPACITY: f32 = 1.0;

/// Stable identifier of a layer within a [`super::VectorRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub(crate) u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Drawing parameters shared by every geometry of a bucket.
///
/// Two geometries of the same layer land in the same bucket when their
/// styles compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    /// RGBA in `[0, 1]`.
    pub stroke_color: [f32; 4],
    pub stroke_width: f32,
    pub fill: bool,
    pub fill_color: [f32; 4],
    /// Radius of point symbols in pixels.
    pub point_radius: f32,
    /// Draw this style's primitives above the tile surface.
    pub z_index: i32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke_color: [1.0, 1.0, 1.0, 1.0],
            stroke_width: 1.0,
            fill: false,
            fill_color: [1.0, 1.0, 1.0, 0.5],
            point_radius: 4.0,
            z_index: 0,
        }
    }
}

impl Style {
    pub fn with_stroke(mut self, color: [f32; 4], width: f32) -> Self {
        self.stroke_color = color;
        self.stroke_width = width;
        self
    }

    pub fn with_fill(mut self, color: [f32; 4]) -> Self {
        self.fill = true;
        self.fill_color = color;
        self
    }
}

/// A named group of geometries drawn together.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    name: String,
    visible: bool,
    opacity: f32,
    min_level: u32,
    max_level: Option<u32>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: DEFAULT_OPACITY,
            min_level: 0,
            max_level: None,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.set_opacity(opacity);
        self
    }

    /// Restricts primitive building to tiles in `min..=max`.
    pub fn with_level_range(mut self, min: u32, max: Option<u32>) -> Self {
        self.min_level = min;
        self.max_level = max;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    /// Whether the layer is drawn at all.
    pub fn is_drawn(&self) -> bool {
        self.visible && self.opacity > 0.0
    }

    /// Whether tiles at `level` build primitives for this layer.
    pub fn builds_at(&self, level: u32) -> bool {
        level >= self.min_level && self.max_level.map_or(true, |max| level <= max)
    }
}
