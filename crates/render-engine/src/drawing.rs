//! Free-hand drawing surface.
//!
//! Strokes are rasterised straight into a persistent pixmap, so the
//! compositor reads finished pixels every frame instead of replaying a
//! stroke list.

use serde::{Deserialize, Serialize};
use tiny_skia::{Color, LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::CanvasPoint;

/// An opaque pen colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PenColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PenColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> ScribeResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ScribeError::config(format!("Invalid pen colour: {hex}")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ScribeError::config(format!("Invalid pen colour: {hex}")))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    fn paint(self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.r, self.g, self.b, 255);
        paint.anti_alias = true;
        paint
    }
}

/// The fixed set of swatches offered while recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<PenColor>,
}

impl Palette {
    /// Exactly four swatches are required.
    pub const SWATCHES: usize = 4;

    pub fn from_hex<S: AsRef<str>>(colors: &[S]) -> ScribeResult<Self> {
        if colors.len() != Self::SWATCHES {
            return Err(ScribeError::config(format!(
                "Palette needs exactly {} colours, got {}",
                Self::SWATCHES,
                colors.len()
            )));
        }
        let colors = colors
            .iter()
            .map(|c| PenColor::from_hex(c.as_ref()))
            .collect::<ScribeResult<Vec<_>>>()?;
        Ok(Self { colors })
    }

    pub fn colors(&self) -> &[PenColor] {
        &self.colors
    }

    pub fn get(&self, index: usize) -> Option<PenColor> {
        self.colors.get(index).copied()
    }

    /// The first swatch is the initial pen colour.
    pub fn default_color(&self) -> PenColor {
        self.colors[0]
    }

    pub fn contains(&self, color: PenColor) -> bool {
        self.colors.contains(&color)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: vec![
                PenColor::rgb(0x00, 0x77, 0xCC),
                PenColor::rgb(0xF4, 0x43, 0x36),
                PenColor::rgb(0x4C, 0xAF, 0x50),
                PenColor::rgb(0x00, 0x00, 0x00),
            ],
        }
    }
}

/// Pen position, pressed flag, and active colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeState {
    pub pressed: bool,
    pub last: CanvasPoint,
    pub color: PenColor,
}

/// Persistent raster the user draws on.
pub struct DrawingSurface {
    pixmap: Pixmap,
    stroke: StrokeState,
    stroke_width: f32,
    segments: u64,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32, stroke_width: f32, color: PenColor) -> ScribeResult<Self> {
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ScribeError::render(format!("Cannot allocate {width}x{height} drawing surface"))
        })?;
        pixmap.fill(Color::WHITE);
        Ok(Self {
            pixmap,
            stroke: StrokeState {
                pressed: false,
                last: CanvasPoint::new(0.0, 0.0),
                color,
            },
            stroke_width,
            segments: 0,
        })
    }

    /// Blank the surface to white and lift the pen. The colour is kept.
    pub fn reset(&mut self) {
        self.pixmap.fill(Color::WHITE);
        self.stroke.pressed = false;
        self.segments = 0;
    }

    /// Start a stroke at `point`.
    pub fn press(&mut self, point: CanvasPoint) {
        self.stroke.pressed = true;
        self.stroke.last = point;
    }

    /// Extend the current stroke to `point`. Returns whether anything was drawn.
    pub fn move_to(&mut self, point: CanvasPoint) -> bool {
        if !self.stroke.pressed {
            return false;
        }
        let from = self.stroke.last;
        let drawn = self.stroke_segment(from, point);
        self.stroke.last = point;
        if drawn {
            self.segments += 1;
        }
        drawn
    }

    /// End the current stroke.
    pub fn release(&mut self) {
        self.stroke.pressed = false;
    }

    /// Change the colour of subsequent segments.
    pub fn set_color(&mut self, color: PenColor) {
        self.stroke.color = color;
    }

    pub fn color(&self) -> PenColor {
        self.stroke.color
    }

    pub fn stroke_state(&self) -> StrokeState {
        self.stroke
    }

    pub fn is_pressed(&self) -> bool {
        self.stroke.pressed
    }

    /// Segments rasterised since the last reset.
    pub fn segments_drawn(&self) -> u64 {
        self.segments
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// RGBA of one pixel, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixel = self.pixmap.pixel(x, y)?.demultiply();
        Some([pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()])
    }

    fn stroke_segment(&mut self, from: CanvasPoint, to: CanvasPoint) -> bool {
        let paint = self.stroke.color.paint();

        // A zero-length segment has no path bounds; a round cap renders it as a dot.
        if from == to {
            let Some(dot) = PathBuilder::from_circle(to.x, to.y, self.stroke_width / 2.0) else {
                return false;
            };
            self.pixmap.fill_path(
                &dot,
                &paint,
                tiny_skia::FillRule::Winding,
                Transform::identity(),
                None,
            );
            return true;
        }

        let mut builder = PathBuilder::new();
        builder.move_to(from.x, from.y);
        builder.line_to(to.x, to.y);
        let Some(path) = builder.finish() else {
            return false;
        };

        let stroke = Stroke {
            width: self.stroke_width,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        true
    }
}
