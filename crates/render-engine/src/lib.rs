//! Scribecast Render Engine
//!
//! CPU rasterisation for the capture units, built on `tiny-skia`:
//!
//! - [`drawing`]: the persistent free-hand drawing surface and pen palette
//! - [`compositor`]: per-frame layering of the drawing surface and the
//!   picture-in-picture camera feed onto the recording canvas
//! - [`visualizer`]: frequency bar rendering for the audio unit

pub mod compositor;
pub mod drawing;
pub mod visualizer;

pub use compositor::{pip_rect, Compositor, PipRect};
pub use drawing::{DrawingSurface, Palette, PenColor, StrokeState};
pub use visualizer::BarVisualizer;
