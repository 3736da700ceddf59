//! Capture session lifecycle.
//!
//! A [`CaptureSession`] owns everything one recording needs: the device
//! stream, the recorder and its chunk collector, the analyser, and the
//! scheduled frame callback. It exists only while a unit is capturing.
//! Closing it releases every resource exactly once; after that, every
//! method refuses with [`ScribeError::SessionClosed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use scribecast_common::clock::RecordingClock;
use scribecast_common::config::CaptureDefaults;
use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::MediaBlob;

use crate::backend::{CaptureBackend, MediaRecorder, MediaStream, RecorderEvent, RecorderState};
use crate::chunks::ChunkSequence;
use crate::notify::Notifier;
use crate::scheduler::{FrameCallback, FrameHandle, FrameScheduler};
use crate::spectrum::FrequencySource;

/// Receives the finished recording. Called exactly once per stopped session.
pub type CompletionHandler = Arc<dyn Fn(MediaBlob) + Send + Sync>;

/// Collaborators shared by the capture units.
#[derive(Clone)]
pub struct CaptureContext {
    pub backend: Arc<dyn CaptureBackend>,
    pub scheduler: Arc<dyn FrameScheduler>,
    pub notifier: Arc<dyn Notifier>,
    pub config: CaptureDefaults,
}

impl CaptureContext {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        scheduler: Arc<dyn FrameScheduler>,
        notifier: Arc<dyn Notifier>,
        config: CaptureDefaults,
    ) -> Self {
        Self {
            backend,
            scheduler,
            notifier,
            config,
        }
    }
}

/// State of a capture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No session.
    Idle,
    /// Waiting for the platform to grant device access.
    Acquiring,
    /// A session is recording.
    Capturing,
    /// The session is being closed.
    Stopping,
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Resources of one recording.
pub struct CaptureSession {
    id: u64,
    clock: RecordingClock,
    stream: Option<Arc<dyn MediaStream>>,
    recorder: Option<Box<dyn MediaRecorder>>,
    collector: Option<JoinHandle<Option<usize>>>,
    analyser: Option<Arc<Mutex<FrequencySource>>>,
    frame: Option<FrameHandle>,
    scheduler: Arc<dyn FrameScheduler>,
    open: bool,
}

impl CaptureSession {
    /// Take ownership of an acquired stream.
    pub fn open(stream: Arc<dyn MediaStream>, scheduler: Arc<dyn FrameScheduler>) -> Self {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, stream = %stream.id(), "Capture session opened");
        Self {
            id,
            clock: RecordingClock::start(),
            stream: Some(stream),
            recorder: None,
            collector: None,
            analyser: None,
            frame: None,
            scheduler,
            open: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Time since the session opened.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn stream(&self) -> ScribeResult<&Arc<dyn MediaStream>> {
        self.ensure_open()?;
        self.stream.as_ref().ok_or(ScribeError::SessionClosed)
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder
            .as_ref()
            .map(|r| r.state())
            .unwrap_or(RecorderState::Inactive)
    }

    /// Keep an analyser until the session closes.
    pub fn attach_analyser(
        &mut self,
        source: FrequencySource,
    ) -> ScribeResult<Arc<Mutex<FrequencySource>>> {
        self.ensure_open()?;
        let analyser = Arc::new(Mutex::new(source));
        self.analyser = Some(analyser.clone());
        Ok(analyser)
    }

    /// Install the recorder and start collecting its chunks.
    ///
    /// `on_complete` receives the concatenated blob once the recorder
    /// reports that it stopped.
    pub fn attach_recorder(
        &mut self,
        recorder: Box<dyn MediaRecorder>,
        events: mpsc::UnboundedReceiver<RecorderEvent>,
        on_complete: CompletionHandler,
    ) -> ScribeResult<()> {
        self.ensure_open()?;
        if self.recorder.is_some() {
            return Err(ScribeError::invalid_state("Session already has a recorder"));
        }
        let mime_type = recorder.mime_type().to_string();
        self.collector = Some(tokio::spawn(collect_chunks(
            self.id,
            events,
            mime_type,
            on_complete,
        )));
        self.recorder = Some(recorder);
        Ok(())
    }

    /// Run `callback` every animation tick until the session closes.
    pub fn schedule_frames(&mut self, callback: FrameCallback) -> ScribeResult<()> {
        self.ensure_open()?;
        if self.frame.is_some() {
            return Err(ScribeError::invalid_state(
                "Session already has a frame callback",
            ));
        }
        self.frame = Some(self.scheduler.request(callback)?);
        Ok(())
    }

    /// Start the attached recorder.
    pub fn start_recording(&mut self, timeslice: Duration) -> ScribeResult<()> {
        self.ensure_open()?;
        let recorder = self
            .recorder
            .as_mut()
            .ok_or_else(|| ScribeError::invalid_state("Session has no recorder"))?;
        recorder.start(timeslice)?;
        tracing::info!(
            session = self.id,
            mime_type = %recorder.mime_type(),
            "Recording started"
        );
        Ok(())
    }

    /// Stop recording, wait for the finished blob to be delivered, and
    /// release every resource. Closing twice is a no-op.
    pub async fn close(&mut self) -> ScribeResult<()> {
        if !self.open {
            return Ok(());
        }
        let (result, delivering) = self.release();

        if let Some(collector) = self.collector.take() {
            if delivering {
                match collector.await {
                    Ok(Some(size)) => {
                        tracing::debug!(session = self.id, size, "Recording delivered")
                    }
                    Ok(None) => tracing::warn!(
                        session = self.id,
                        "Recorder went away without reporting a stop"
                    ),
                    Err(e) => tracing::error!(session = self.id, error = %e, "Chunk collector failed"),
                }
            } else {
                collector.abort();
            }
        }
        result
    }

    /// Release everything without waiting for the blob. A recorder that was
    /// recording still delivers it from its collector task.
    pub fn close_now(&mut self) {
        if !self.open {
            return;
        }
        let (result, delivering) = self.release();
        if let Some(collector) = self.collector.take() {
            if !delivering {
                collector.abort();
            }
        }
        if let Err(e) = result {
            tracing::warn!(session = self.id, error = %e, "Recorder failed to stop cleanly");
        }
    }

    /// Tear down in order: recorder, frame callback, device tracks,
    /// analyser. Returns the recorder's stop result and whether a completion
    /// is on its way.
    fn release(&mut self) -> (ScribeResult<()>, bool) {
        self.open = false;

        let mut result = Ok(());
        let mut delivering = false;
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.state() == RecorderState::Recording {
                delivering = true;
                result = recorder.stop();
            }
        }

        if let Some(handle) = self.frame.take() {
            self.scheduler.cancel(handle);
        }

        if let Some(stream) = self.stream.take() {
            let released = stream.stop_all();
            tracing::debug!(session = self.id, released, "Device tracks released");
        }

        if let Some(analyser) = self.analyser.take() {
            analyser.lock().close();
        }

        tracing::info!(
            session = self.id,
            started_at = %self.clock.started_at(),
            duration_secs = self.clock.elapsed().as_secs_f64(),
            "Capture session closed"
        );
        (result, delivering)
    }

    fn ensure_open(&self) -> ScribeResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ScribeError::SessionClosed)
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close_now();
    }
}

/// Accumulate recorder chunks until the recorder stops, then hand the blob
/// to `on_complete`. Returns the delivered size, or `None` if the recorder
/// went away first.
async fn collect_chunks(
    session: u64,
    mut events: mpsc::UnboundedReceiver<RecorderEvent>,
    mime_type: String,
    on_complete: CompletionHandler,
) -> Option<usize> {
    let mut chunks = ChunkSequence::new();
    while let Some(event) = events.recv().await {
        match event {
            RecorderEvent::DataAvailable(data) => {
                let size = data.len();
                if chunks.push(data) {
                    tracing::trace!(session, size, total = chunks.total_bytes(), "Chunk recorded");
                }
            }
            RecorderEvent::Error(message) => {
                tracing::warn!(session, %message, "Recorder reported an error");
            }
            RecorderEvent::Stopped => {
                let count = chunks.len();
                let blob = chunks.into_blob(mime_type);
                let size = blob.size();
                tracing::info!(session, chunks = count, size, mime_type = %blob.mime_type(), "Recording finalized");
                on_complete(blob);
                return Some(size);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{ManualScheduler, MockBackend};
    use crate::backend::{RecorderInput, RecorderOptions};
    use bytes::Bytes;
    use scribecast_platform_core::StreamConstraints;

    async fn open_session(
        backend: &MockBackend,
        scheduler: Arc<ManualScheduler>,
    ) -> CaptureSession {
        let stream = backend
            .get_user_media(StreamConstraints::AUDIO_ONLY)
            .await
            .unwrap();
        CaptureSession::open(stream, scheduler)
    }

    #[tokio::test]
    async fn closed_session_rejects_calls() {
        let backend = MockBackend::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let mut session = open_session(&backend, scheduler.clone()).await;

        session.close().await.unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.stream(), Err(ScribeError::SessionClosed)));
        assert!(matches!(
            session.schedule_frames(Box::new(|| {})),
            Err(ScribeError::SessionClosed)
        ));
        assert!(matches!(
            session.start_recording(Duration::from_secs(1)),
            Err(ScribeError::SessionClosed)
        ));
        // Second close does nothing.
        session.close().await.unwrap();
        assert_eq!(backend.last_stream().unwrap().total_stop_calls(), 1);
    }

    #[tokio::test]
    async fn close_delivers_blob_and_cancels_frames() {
        let backend = MockBackend::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let mut session = open_session(&backend, scheduler.clone()).await;

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = backend
            .create_recorder(
                RecorderInput::Stream(session.stream().unwrap().clone()),
                RecorderOptions {
                    mime_type: "audio/webm".into(),
                    audio_sample_rate: 48000,
                },
                tx,
            )
            .unwrap();
        session
            .attach_recorder(recorder, rx, Arc::new(move |blob| sink.lock().push(blob)))
            .unwrap();
        session.schedule_frames(Box::new(|| {})).unwrap();
        assert_eq!(session.recorder_state(), RecorderState::Inactive);
        session.start_recording(Duration::from_secs(1)).unwrap();
        assert_eq!(session.recorder_state(), RecorderState::Recording);

        let probe = backend.last_recorder().unwrap();
        probe.emit(Bytes::from(vec![1u8; 10]));
        probe.queue_final(Bytes::from(vec![2u8; 5]));

        session.close().await.unwrap();
        assert_eq!(session.recorder_state(), RecorderState::Inactive);
        let blobs = delivered.lock();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size(), 15);
        assert_eq!(scheduler.requested(), scheduler.cancelled());
        assert_eq!(scheduler.live(), 0);
    }

    #[tokio::test]
    async fn unstarted_recorder_delivers_nothing() {
        let backend = MockBackend::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let mut session = open_session(&backend, scheduler).await;

        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = backend
            .create_recorder(
                RecorderInput::Stream(session.stream().unwrap().clone()),
                RecorderOptions {
                    mime_type: "audio/webm".into(),
                    audio_sample_rate: 48000,
                },
                tx,
            )
            .unwrap();
        session
            .attach_recorder(recorder, rx, Arc::new(move |_| *counter.lock() += 1))
            .unwrap();

        session.close().await.unwrap();
        assert_eq!(*calls.lock(), 0);
        assert!(backend.last_stream().unwrap().all_tracks_stopped());
    }
}
