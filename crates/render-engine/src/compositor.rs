//! Frame compositor: layers the drawing surface and the camera feed.
//!
//! Each animation tick clears the recording canvas, draws the drawing
//! surface stretched over the whole canvas, and then the latest camera
//! frame as a picture-in-picture overlay in the top-right corner.

use bytes::Bytes;
use tiny_skia::{Color, Pixmap, PixmapPaint, PixmapRef, Transform};

use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::VideoFrame;

/// Picture-in-picture placement in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Compute the overlay rectangle for a video of `video_width`×`video_height`.
///
/// The overlay is `ratio` of the canvas width, keeps the video aspect ratio,
/// and sits `margin` pixels from the top and right edges. Returns `None`
/// while the video has no dimensions yet.
pub fn pip_rect(
    canvas_width: u32,
    video_width: u32,
    video_height: u32,
    ratio: f32,
    margin: f32,
) -> Option<PipRect> {
    if video_width == 0 || video_height == 0 || canvas_width == 0 || ratio <= 0.0 {
        return None;
    }
    let width = canvas_width as f32 * ratio;
    let height = video_height as f32 * (width / video_width as f32);
    Some(PipRect {
        x: canvas_width as f32 - width - margin,
        y: margin,
        width,
        height,
    })
}

/// What one compositing pass managed to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOutcome {
    /// Where the camera overlay landed, if a usable frame was available.
    pub pip: Option<PipRect>,
}

/// Owns the offscreen recording canvas.
pub struct Compositor {
    canvas: Pixmap,
    pip_ratio: f32,
    pip_margin: f32,
    frames: u64,
}

impl Compositor {
    pub fn new(width: u32, height: u32, pip_ratio: f32, pip_margin: f32) -> ScribeResult<Self> {
        let canvas = Pixmap::new(width, height).ok_or_else(|| {
            ScribeError::render(format!("Cannot allocate {width}x{height} recording canvas"))
        })?;
        Ok(Self {
            canvas,
            pip_ratio,
            pip_margin,
            frames: 0,
        })
    }

    /// Run one compositing pass.
    pub fn composite(&mut self, base: &Pixmap, video: Option<&VideoFrame>) -> CompositeOutcome {
        self.canvas.fill(Color::TRANSPARENT);

        let sx = self.canvas.width() as f32 / base.width() as f32;
        let sy = self.canvas.height() as f32 / base.height() as f32;
        self.canvas.draw_pixmap(
            0,
            0,
            base.as_ref(),
            &PixmapPaint::default(),
            Transform::from_scale(sx, sy),
            None,
        );

        let pip = video.and_then(|frame| self.draw_pip(frame));
        self.frames += 1;
        CompositeOutcome { pip }
    }

    fn draw_pip(&mut self, frame: &VideoFrame) -> Option<PipRect> {
        if !frame.is_well_formed() {
            tracing::warn!(
                width = frame.width,
                height = frame.height,
                len = frame.data.len(),
                "Skipping malformed camera frame"
            );
            return None;
        }
        let rect = pip_rect(
            self.canvas.width(),
            frame.width,
            frame.height,
            self.pip_ratio,
            self.pip_margin,
        )?;
        let source = PixmapRef::from_bytes(&frame.data, frame.width, frame.height)?;

        let scale = rect.width / frame.width as f32;
        self.canvas.draw_pixmap(
            0,
            0,
            source,
            &PixmapPaint::default(),
            Transform::from_row(scale, 0.0, 0.0, scale, rect.x, rect.y),
            None,
        );
        Some(rect)
    }

    /// Snapshot of the recording canvas as a frame for the canvas stream.
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame::new(
            self.canvas.width(),
            self.canvas.height(),
            Bytes::copy_from_slice(self.canvas.data()),
        )
    }

    /// Compositing passes run so far.
    pub fn frames_composited(&self) -> u64 {
        self.frames
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }
}
