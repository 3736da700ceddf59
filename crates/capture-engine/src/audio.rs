//! Microphone capture with a live frequency visualiser.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::StreamConstraints;
use scribecast_render_engine::BarVisualizer;

use crate::backend::{MediaStream, RecorderInput, RecorderOptions};
use crate::session::{CaptureContext, CaptureSession, CompletionHandler, UnitState};
use crate::spectrum::FrequencySource;

/// Records the microphone and draws its spectrum every animation tick.
pub struct AudioCaptureUnit {
    ctx: CaptureContext,
    on_complete: CompletionHandler,
    state: UnitState,
    session: Option<CaptureSession>,
    visualizer: Arc<Mutex<BarVisualizer>>,
}

impl AudioCaptureUnit {
    pub fn new(ctx: CaptureContext, on_complete: CompletionHandler) -> ScribeResult<Self> {
        let visualizer = BarVisualizer::new(
            ctx.config.visualizer_width,
            ctx.config.visualizer_height,
        )?;
        Ok(Self {
            ctx,
            on_complete,
            state: UnitState::Idle,
            session: None,
            visualizer: Arc::new(Mutex::new(visualizer)),
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

    /// The visualiser canvas, redrawn while capturing.
    pub fn visualizer(&self) -> Arc<Mutex<BarVisualizer>> {
        self.visualizer.clone()
    }

    /// Acquire the microphone and start recording.
    ///
    /// Device failures are reported through the notifier and leave the unit
    /// idle; calling `start` again retries from scratch.
    pub async fn start(&mut self) -> ScribeResult<()> {
        if self.session.is_some() {
            return Err(ScribeError::invalid_state("Audio capture is already running"));
        }

        self.state = UnitState::Acquiring;
        let stream = match self
            .ctx
            .backend
            .get_user_media(StreamConstraints::AUDIO_ONLY)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = UnitState::Idle;
                tracing::error!(error = %e, "Error accessing microphone");
                self.ctx
                    .notifier
                    .error(&format!("Error accessing microphone: {e}"));
                return Err(e);
            }
        };

        match self.open_session(stream) {
            Ok(session) => {
                self.session = Some(session);
                self.state = UnitState::Capturing;
                Ok(())
            }
            Err(e) => {
                self.state = UnitState::Idle;
                tracing::error!(error = %e, "Failed to start audio recording");
                self.ctx
                    .notifier
                    .error(&format!("Could not start audio recording: {e}"));
                Err(e)
            }
        }
    }

    /// Stop recording and release the microphone. The completion handler
    /// has run by the time this returns. Does nothing when idle.
    pub async fn stop(&mut self) -> ScribeResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.state = UnitState::Stopping;
        tracing::debug!(
            session = session.id(),
            recorder = ?session.recorder_state(),
            "Stopping audio capture"
        );
        let result = session.close().await;
        self.state = UnitState::Idle;
        result
    }

    // A failure part way through drops the session, which releases
    // whatever was already attached.
    fn open_session(&self, stream: Arc<dyn MediaStream>) -> ScribeResult<CaptureSession> {
        let config = &self.ctx.config;
        let mut session = CaptureSession::open(stream.clone(), self.ctx.scheduler.clone());

        let source = FrequencySource::attach(stream.as_ref(), config.fft_size)?;
        let analyser = session.attach_analyser(source)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recorder = self.ctx.backend.create_recorder(
            RecorderInput::Stream(stream),
            RecorderOptions {
                mime_type: config.audio_mime_type.clone(),
                audio_sample_rate: config.audio_sample_rate,
            },
            events_tx,
        )?;
        session.attach_recorder(recorder, events_rx, self.on_complete.clone())?;

        let visualizer = self.visualizer.clone();
        let mut bins = vec![0u8; analyser.lock().frequency_bin_count()];
        session.schedule_frames(Box::new(move || {
            analyser.lock().read(&mut bins);
            visualizer.lock().render(&bins);
        }))?;

        session.start_recording(config.timeslice())?;
        Ok(session)
    }
}
