//! Frequency bar visualiser for the audio unit.

use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use scribecast_common::error::{ScribeError, ScribeResult};

const BACKGROUND: [u8; 3] = [248, 249, 250];
const BAR: [u8; 3] = [0, 119, 204];

/// Renders byte frequency data as vertical bars on a fixed-size canvas.
pub struct BarVisualizer {
    canvas: Pixmap,
    frames: u64,
}

impl BarVisualizer {
    pub fn new(width: u32, height: u32) -> ScribeResult<Self> {
        let mut canvas = Pixmap::new(width, height).ok_or_else(|| {
            ScribeError::render(format!("Cannot allocate {width}x{height} visualiser"))
        })?;
        canvas.fill(Color::TRANSPARENT);
        Ok(Self { canvas, frames: 0 })
    }

    /// Draw one frame of bars.
    ///
    /// Each bar is `width / bins * 2.5` wide with a one pixel gap, and
    /// `value / 2` pixels tall measured from the bottom edge. Bars running
    /// past the right edge are clipped.
    pub fn render(&mut self, bins: &[u8]) {
        self.canvas.fill(Color::from_rgba8(
            BACKGROUND[0],
            BACKGROUND[1],
            BACKGROUND[2],
            255,
        ));
        self.frames += 1;
        if bins.is_empty() {
            return;
        }

        let width = self.canvas.width() as f32;
        let height = self.canvas.height() as f32;
        let bar_width = width / bins.len() as f32 * 2.5;

        let mut paint = Paint::default();
        paint.set_color_rgba8(BAR[0], BAR[1], BAR[2], 255);

        let mut x = 0.0;
        for &value in bins {
            if x >= width {
                break;
            }
            let bar_height = value as f32 / 2.0;
            if bar_height > 0.0 {
                if let Some(rect) = Rect::from_xywh(x, height - bar_height, bar_width, bar_height)
                {
                    self.canvas
                        .fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
            x += bar_width + 1.0;
        }
    }

    /// Frames drawn so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(v: &BarVisualizer, x: u32, y: u32) -> [u8; 3] {
        let p = v.canvas().pixel(x, y).unwrap().demultiply();
        [p.red(), p.green(), p.blue()]
    }

    #[test]
    fn silent_input_is_plain_background() {
        let mut v = BarVisualizer::new(600, 80).unwrap();
        v.render(&[0u8; 128]);
        assert_eq!(pixel(&v, 0, 79), BACKGROUND);
        assert_eq!(pixel(&v, 300, 40), BACKGROUND);
        assert_eq!(v.frames_rendered(), 1);
    }

    #[test]
    fn loud_first_bin_fills_from_bottom() {
        let mut v = BarVisualizer::new(600, 80).unwrap();
        let mut bins = [0u8; 128];
        bins[0] = 100;
        v.render(&bins);
        // 100 / 2 = 50 px tall, 600 / 128 * 2.5 ≈ 11.7 px wide.
        assert_eq!(pixel(&v, 5, 79), BAR);
        assert_eq!(pixel(&v, 5, 31), BAR);
        assert_eq!(pixel(&v, 5, 28), BACKGROUND);
        assert_eq!(pixel(&v, 20, 79), BACKGROUND);
    }
}
