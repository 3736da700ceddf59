//! Camera capture composited over a free-hand drawing surface.
//!
//! While capturing, every animation tick layers the drawing surface and a
//! picture-in-picture of the camera onto an offscreen canvas. The canvas is
//! exposed as a fixed-rate stream and that stream is what gets recorded.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::{
    normalize_pointer, BoundingRect, PointerInput, StreamConstraints, VideoFrame,
};
use scribecast_render_engine::{Compositor, DrawingSurface, Palette, PenColor};

use crate::backend::{CanvasCaptureStream, MediaStream, RecorderInput, RecorderOptions};
use crate::session::{CaptureContext, CaptureSession, CompletionHandler, UnitState};

/// Records the camera with the user's annotations.
pub struct VideoCaptureUnit {
    ctx: CaptureContext,
    on_complete: CompletionHandler,
    state: UnitState,
    session: Option<CaptureSession>,
    palette: Palette,
    surface: Arc<Mutex<DrawingSurface>>,
    canvas: Option<watch::Receiver<Option<VideoFrame>>>,
}

impl VideoCaptureUnit {
    pub fn new(ctx: CaptureContext, on_complete: CompletionHandler) -> ScribeResult<Self> {
        let palette = Palette::from_hex(&ctx.config.palette)?;
        let surface = DrawingSurface::new(
            ctx.config.canvas_width,
            ctx.config.canvas_height,
            ctx.config.stroke_width,
            palette.default_color(),
        )?;
        Ok(Self {
            ctx,
            on_complete,
            state: UnitState::Idle,
            session: None,
            palette,
            surface: Arc::new(Mutex::new(surface)),
            canvas: None,
        })
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Read access to the drawing surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&DrawingSurface) -> R) -> R {
        f(&self.surface.lock())
    }

    /// The frame most recently composited for the recording canvas.
    pub fn recording_frame(&self) -> Option<VideoFrame> {
        self.canvas.as_ref().and_then(|rx| rx.borrow().clone())
    }

    /// Acquire camera and microphone, blank the drawing surface, and start
    /// recording the composited canvas.
    pub async fn start(&mut self) -> ScribeResult<()> {
        if self.session.is_some() {
            return Err(ScribeError::invalid_state("Video capture is already running"));
        }

        self.state = UnitState::Acquiring;
        let stream = match self
            .ctx
            .backend
            .get_user_media(StreamConstraints::AUDIO_VIDEO)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = UnitState::Idle;
                tracing::error!(error = %e, "Error accessing camera");
                self.ctx
                    .notifier
                    .error(&format!("Error accessing camera: {e}"));
                return Err(e);
            }
        };

        match self.open_session(stream) {
            Ok((session, canvas)) => {
                self.session = Some(session);
                self.canvas = Some(canvas);
                self.state = UnitState::Capturing;
                Ok(())
            }
            Err(e) => {
                self.state = UnitState::Idle;
                tracing::error!(error = %e, "Failed to start video recording");
                self.ctx
                    .notifier
                    .error(&format!("Could not start video recording: {e}"));
                Err(e)
            }
        }
    }

    /// Stop recording and release camera and microphone. The completion
    /// handler has run by the time this returns. Does nothing when idle.
    pub async fn stop(&mut self) -> ScribeResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.state = UnitState::Stopping;
        tracing::debug!(
            session = session.id(),
            recorder = ?session.recorder_state(),
            "Stopping video capture"
        );
        let result = session.close().await;
        self.surface.lock().release();
        self.state = UnitState::Idle;
        result
    }

    /// Begin a stroke. Ignored unless capturing.
    pub fn pointer_down(&self, input: &PointerInput, rect: &BoundingRect) -> bool {
        if !self.is_capturing() {
            return false;
        }
        let mut surface = self.surface.lock();
        match normalize_pointer(input, rect, surface.width(), surface.height()) {
            Some(point) => {
                surface.press(point);
                true
            }
            None => false,
        }
    }

    /// Extend the current stroke. Returns whether a segment was drawn.
    pub fn pointer_move(&self, input: &PointerInput, rect: &BoundingRect) -> bool {
        if !self.is_capturing() {
            return false;
        }
        let mut surface = self.surface.lock();
        match normalize_pointer(input, rect, surface.width(), surface.height()) {
            Some(point) => surface.move_to(point),
            None => false,
        }
    }

    /// End the current stroke. Also used when the pointer leaves the canvas.
    pub fn pointer_up(&self) -> bool {
        let mut surface = self.surface.lock();
        let was_pressed = surface.is_pressed();
        surface.release();
        was_pressed
    }

    /// Switch the pen to palette entry `index` for subsequent strokes.
    pub fn select_color(&self, index: usize) -> bool {
        if !self.is_capturing() {
            return false;
        }
        match self.palette.get(index) {
            Some(color) => {
                self.surface.lock().set_color(color);
                true
            }
            None => false,
        }
    }

    pub fn pen_color(&self) -> PenColor {
        self.surface.lock().color()
    }

    fn open_session(
        &self,
        stream: Arc<dyn MediaStream>,
    ) -> ScribeResult<(CaptureSession, watch::Receiver<Option<VideoFrame>>)> {
        let config = &self.ctx.config;
        let mut session = CaptureSession::open(stream.clone(), self.ctx.scheduler.clone());

        let camera = stream
            .video_frames()
            .ok_or_else(|| ScribeError::capture("Stream has no camera track"))?;

        self.surface.lock().reset();
        let mut compositor = Compositor::new(
            config.canvas_width,
            config.canvas_height,
            config.pip_width_ratio,
            config.pip_margin,
        )?;

        let (canvas_tx, canvas_rx) = watch::channel(None);
        let canvas_stream = CanvasCaptureStream::new(
            canvas_rx.clone(),
            config.canvas_width,
            config.canvas_height,
            config.capture_fps,
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recorder = self.ctx.backend.create_recorder(
            RecorderInput::Canvas(canvas_stream),
            RecorderOptions {
                mime_type: config.video_mime_type.clone(),
                audio_sample_rate: config.audio_sample_rate,
            },
            events_tx,
        )?;
        session.attach_recorder(recorder, events_rx, self.on_complete.clone())?;

        let surface = self.surface.clone();
        let mut warned = false;
        session.schedule_frames(Box::new(move || {
            let frame = camera.borrow().clone();
            let outcome = {
                let surface = surface.lock();
                compositor.composite(surface.pixmap(), frame.as_ref())
            };
            if outcome.pip.is_none() && !warned {
                warned = true;
                tracing::warn!("No camera frame available; compositing drawing only");
            }
            canvas_tx.send_replace(Some(compositor.snapshot()));
        }))?;

        session.start_recording(config.timeslice())?;
        Ok((session, canvas_rx))
    }
}
