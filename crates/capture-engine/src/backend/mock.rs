//! In-process backend with scriptable devices and recorders.
//!
//! Used by the test suite and by `scribecast record --backend mock`.
//! Every acquisition, track release, recorder and frame callback is
//! observable so tests can assert that nothing outlives a session.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use scribecast_common::error::{DeviceAccessKind, ScribeError, ScribeResult};
use scribecast_platform_core::{MediaKind, StreamConstraints, TrackState, VideoFrame};

use super::{
    CaptureBackend, MediaRecorder, MediaStream, MediaTrack, RecorderEvent, RecorderInput,
    RecorderOptions, RecorderState, SampleBlock,
};
use crate::notify::{NoticeLevel, Notifier};
use crate::scheduler::{FrameCallback, FrameHandle, FrameScheduler};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    format!("{prefix}-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Camera frame a fresh mock stream starts with.
const DEFAULT_CAMERA: (u32, u32, [u8; 3]) = (160, 120, [90, 90, 90]);

#[derive(Default)]
struct MockState {
    failures: VecDeque<DeviceAccessKind>,
    acquisitions: usize,
    streams: Vec<Arc<MockStream>>,
    recorders: Vec<RecorderProbe>,
}

/// Media type of auto-emitted recordings. Their chunks are raw samples or
/// frames, not a playable container.
pub const RAW_MEDIA_TYPE: &str = "application/octet-stream";

/// Scriptable [`CaptureBackend`].
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    auto_emit: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose recorders produce chunks on their own every
    /// timeslice: raw PCM for stream recorders, the latest RGBA frame for
    /// canvas recorders.
    pub fn with_auto_emit() -> Self {
        Self {
            auto_emit: true,
            ..Self::default()
        }
    }

    /// Make the next acquisition fail with `kind`. Calls queue up.
    pub fn fail_next_acquire(&self, kind: DeviceAccessKind) {
        self.state.lock().failures.push_back(kind);
    }

    /// Acquisition attempts so far, failed ones included.
    pub fn acquisitions(&self) -> usize {
        self.state.lock().acquisitions
    }

    /// Streams handed out, oldest first.
    pub fn streams(&self) -> Vec<Arc<MockStream>> {
        self.state.lock().streams.clone()
    }

    pub fn last_stream(&self) -> Option<Arc<MockStream>> {
        self.state.lock().streams.last().cloned()
    }

    /// Recorders created, oldest first.
    pub fn recorders(&self) -> Vec<RecorderProbe> {
        self.state.lock().recorders.clone()
    }

    pub fn last_recorder(&self) -> Option<RecorderProbe> {
        self.state.lock().recorders.last().cloned()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_user_media(
        &self,
        constraints: StreamConstraints,
    ) -> ScribeResult<Arc<dyn MediaStream>> {
        let mut state = self.state.lock();
        state.acquisitions += 1;
        if let Some(kind) = state.failures.pop_front() {
            return Err(ScribeError::device_access(
                kind,
                format!("mock device refused {:?}", constraints.kinds()),
            ));
        }
        if constraints.kinds().is_empty() {
            return Err(ScribeError::capture("At least one of audio or video must be requested"));
        }

        let stream = Arc::new(MockStream::new(constraints));
        state.streams.push(stream.clone());
        Ok(stream)
    }

    fn create_recorder(
        &self,
        input: RecorderInput,
        options: RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> ScribeResult<Box<dyn MediaRecorder>> {
        let shared = Arc::new(Mutex::new(RecorderShared {
            state: RecorderState::Inactive,
            events,
            final_chunks: VecDeque::new(),
            input,
            timeslice: None,
            starts: 0,
            stops: 0,
            pcm: None,
        }));
        let probe = RecorderProbe {
            shared: shared.clone(),
        };
        self.state.lock().recorders.push(probe);
        let mime_type = if self.auto_emit {
            RAW_MEDIA_TYPE.to_string()
        } else {
            options.mime_type
        };
        Ok(Box::new(MockRecorder {
            shared,
            mime_type,
            auto_emit: self.auto_emit,
            ticker: None,
        }))
    }
}

/// A track whose releases are counted.
pub struct MockTrack {
    id: String,
    kind: MediaKind,
    ended: AtomicBool,
    stops: AtomicUsize,
}

impl MockTrack {
    fn new(kind: MediaKind) -> Self {
        Self {
            id: next_id("track"),
            kind,
            ended: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    /// How many times `stop` was called.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// A device stream fed by the test.
pub struct MockStream {
    id: String,
    tracks: Vec<Arc<MockTrack>>,
    audio: Option<broadcast::Sender<SampleBlock>>,
    video: Option<watch::Sender<Option<VideoFrame>>>,
}

impl MockStream {
    fn new(constraints: StreamConstraints) -> Self {
        let tracks = constraints
            .kinds()
            .into_iter()
            .map(|kind| Arc::new(MockTrack::new(kind)))
            .collect();
        let audio = constraints.audio.then(|| broadcast::channel(64).0);
        let video = constraints.video.then(|| {
            let (w, h, rgb) = DEFAULT_CAMERA;
            watch::channel(Some(VideoFrame::solid(w, h, rgb))).0
        });
        Self {
            id: next_id("stream"),
            tracks,
            audio,
            video,
        }
    }

    pub fn mock_tracks(&self) -> &[Arc<MockTrack>] {
        &self.tracks
    }

    /// Whether every track has been stopped at least once.
    pub fn all_tracks_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.stop_count() > 0)
    }

    /// Total `stop` calls across tracks.
    pub fn total_stop_calls(&self) -> usize {
        self.tracks.iter().map(|t| t.stop_count()).sum()
    }

    /// Deliver PCM to audio subscribers. Returns false without an audio track.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        match &self.audio {
            Some(tx) => {
                let _ = tx.send(SampleBlock::from(samples));
                true
            }
            None => false,
        }
    }

    /// Replace the current camera frame. `None` simulates a camera that has
    /// not produced a frame yet.
    pub fn push_frame(&self, frame: Option<VideoFrame>) -> bool {
        match &self.video {
            Some(tx) => {
                tx.send_replace(frame);
                true
            }
            None => false,
        }
    }
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn MediaTrack>)
            .collect()
    }

    fn audio_samples(&self) -> Option<broadcast::Receiver<SampleBlock>> {
        self.audio.as_ref().map(|tx| tx.subscribe())
    }

    fn video_frames(&self) -> Option<watch::Receiver<Option<VideoFrame>>> {
        self.video.as_ref().map(|tx| tx.subscribe())
    }
}

struct RecorderShared {
    state: RecorderState,
    events: mpsc::UnboundedSender<RecorderEvent>,
    final_chunks: VecDeque<Bytes>,
    input: RecorderInput,
    timeslice: Option<Duration>,
    starts: usize,
    stops: usize,
    pcm: Option<broadcast::Receiver<SampleBlock>>,
}

impl RecorderShared {
    fn emit(&self, data: Bytes) -> bool {
        if self.state != RecorderState::Recording {
            return false;
        }
        self.events.send(RecorderEvent::DataAvailable(data)).is_ok()
    }

    /// One timeslice worth of media from the recorder input.
    fn sample_input(&mut self) -> Bytes {
        match &self.input {
            RecorderInput::Canvas(canvas) => canvas
                .latest()
                .map(|frame| frame.data)
                .unwrap_or_default(),
            RecorderInput::Stream(_) => {
                let Some(rx) = self.pcm.as_mut() else {
                    return Bytes::new();
                };
                let mut buf = BytesMut::new();
                while let Ok(block) = rx.try_recv() {
                    for sample in block.iter() {
                        buf.extend_from_slice(&sample.to_le_bytes());
                    }
                }
                buf.freeze()
            }
        }
    }
}

/// Test-side handle onto a mock recorder.
#[derive(Clone)]
pub struct RecorderProbe {
    shared: Arc<Mutex<RecorderShared>>,
}

impl RecorderProbe {
    /// Emit a time-sliced chunk. Ignored unless recording.
    pub fn emit(&self, data: impl Into<Bytes>) -> bool {
        self.shared.lock().emit(data.into())
    }

    /// Queue the chunk flushed by the next `stop`.
    pub fn queue_final(&self, data: impl Into<Bytes>) {
        self.shared.lock().final_chunks.push_back(data.into());
    }

    /// Emit the canvas frame the recorder would sample right now.
    /// Returns the chunk size, or `None` when nothing was emitted.
    pub fn capture_frame(&self) -> Option<usize> {
        let shared = self.shared.lock();
        let RecorderInput::Canvas(canvas) = &shared.input else {
            return None;
        };
        let frame = canvas.latest()?;
        let size = frame.data.len();
        shared.emit(frame.data).then_some(size)
    }

    pub fn state(&self) -> RecorderState {
        self.shared.lock().state
    }

    pub fn timeslice(&self) -> Option<Duration> {
        self.shared.lock().timeslice
    }

    pub fn start_count(&self) -> usize {
        self.shared.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.shared.lock().stops
    }

    pub fn is_canvas(&self) -> bool {
        matches!(self.shared.lock().input, RecorderInput::Canvas(_))
    }
}

struct MockRecorder {
    shared: Arc<Mutex<RecorderShared>>,
    mime_type: String,
    auto_emit: bool,
    ticker: Option<JoinHandle<()>>,
}

impl MockRecorder {
    fn spawn_ticker(&self, timeslice: Duration) -> ScribeResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ScribeError::recorder("Auto-emitting recorder requires a running tokio runtime")
        })?;
        let shared = self.shared.clone();
        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut guard = shared.lock();
                let chunk = guard.sample_input();
                if !guard.emit(chunk) {
                    break;
                }
            }
        }))
    }
}

impl MediaRecorder for MockRecorder {
    fn start(&mut self, timeslice: Duration) -> ScribeResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state == RecorderState::Recording {
                return Err(ScribeError::invalid_state("Recorder is already recording"));
            }
            shared.state = RecorderState::Recording;
            shared.timeslice = Some(timeslice);
            shared.starts += 1;
            if let RecorderInput::Stream(stream) = &shared.input {
                shared.pcm = stream.audio_samples();
            }
        }
        if self.auto_emit {
            self.ticker = Some(self.spawn_ticker(timeslice)?);
        }
        Ok(())
    }

    fn stop(&mut self) -> ScribeResult<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let mut shared = self.shared.lock();
        if shared.state == RecorderState::Inactive {
            return Ok(());
        }

        let mut last = BytesMut::new();
        while let Some(chunk) = shared.final_chunks.pop_front() {
            last.extend_from_slice(&chunk);
        }
        if self.auto_emit {
            let tail = shared.sample_input();
            last.extend_from_slice(&tail);
        }
        let _ = shared.events.send(RecorderEvent::DataAvailable(last.freeze()));
        let _ = shared.events.send(RecorderEvent::Stopped);
        shared.state = RecorderState::Inactive;
        shared.stops += 1;
        shared.pcm = None;
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.shared.lock().state
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for MockRecorder {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    callbacks: BTreeMap<u64, FrameCallback>,
    requested: Vec<FrameHandle>,
    cancelled: Vec<FrameHandle>,
}

/// A [`FrameScheduler`] that only runs callbacks when told to.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live callback once. Returns how many ran.
    pub fn tick(&self) -> usize {
        let mut state = self.state.lock();
        for callback in state.callbacks.values_mut() {
            callback();
        }
        state.callbacks.len()
    }

    pub fn live(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    pub fn requested(&self) -> Vec<FrameHandle> {
        self.state.lock().requested.clone()
    }

    pub fn cancelled(&self) -> Vec<FrameHandle> {
        self.state.lock().cancelled.clone()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request(&self, callback: FrameCallback) -> ScribeResult<FrameHandle> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = FrameHandle(state.next_id);
        state.callbacks.insert(handle.0, callback);
        state.requested.push(handle);
        Ok(handle)
    }

    fn cancel(&self, handle: FrameHandle) {
        let mut state = self.state.lock();
        if state.callbacks.remove(&handle.0).is_some() {
            state.cancelled.push(handle);
        }
    }
}

/// A [`Notifier`] that keeps everything it is told.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|(level, _)| *level == NoticeLevel::Error)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_failure_applies_once() {
        let backend = MockBackend::new();
        backend.fail_next_acquire(DeviceAccessKind::PermissionDenied);

        let err = backend
            .get_user_media(StreamConstraints::AUDIO_ONLY)
            .await
            .err()
            .unwrap();
        assert!(err.is_device_access());
        assert!(backend
            .get_user_media(StreamConstraints::AUDIO_ONLY)
            .await
            .is_ok());
        assert_eq!(backend.acquisitions(), 2);
        assert_eq!(backend.streams().len(), 1);
    }

    #[tokio::test]
    async fn stream_exposes_requested_taps() {
        let backend = MockBackend::new();
        let stream = backend
            .get_user_media(StreamConstraints::AUDIO_VIDEO)
            .await
            .unwrap();
        assert_eq!(stream.tracks().len(), 2);
        assert!(stream.audio_samples().is_some());
        let frames = stream.video_frames().unwrap();
        assert!(frames.borrow().is_some());
        assert_eq!(stream.stop_all(), 2);
        assert_eq!(stream.stop_all(), 0);
    }

    #[test]
    fn recorder_ignores_chunks_when_inactive() {
        let backend = MockBackend::new();
        let stream: Arc<dyn MediaStream> = Arc::new(MockStream::new(StreamConstraints::AUDIO_ONLY));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut recorder = backend
            .create_recorder(
                RecorderInput::Stream(stream),
                RecorderOptions {
                    mime_type: "audio/webm".into(),
                    audio_sample_rate: 48000,
                },
                tx,
            )
            .unwrap();
        let probe = backend.last_recorder().unwrap();

        assert!(!probe.emit(Bytes::from_static(b"early")));
        recorder.start(Duration::from_secs(1)).unwrap();
        assert!(probe.emit(Bytes::from_static(b"abc")));
        probe.queue_final(Bytes::from_static(b"de"));
        recorder.stop().unwrap();
        recorder.stop().unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            RecorderEvent::DataAvailable(Bytes::from_static(b"abc"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RecorderEvent::DataAvailable(Bytes::from_static(b"de"))
        );
        assert_eq!(rx.try_recv().unwrap(), RecorderEvent::Stopped);
        assert!(rx.try_recv().is_err());
        assert_eq!(probe.stop_count(), 1);
    }

    #[test]
    fn auto_emitted_recordings_are_tagged_raw() {
        let options = || RecorderOptions {
            mime_type: "audio/webm".into(),
            audio_sample_rate: 48000,
        };
        let stream: Arc<dyn MediaStream> = Arc::new(MockStream::new(StreamConstraints::AUDIO_ONLY));

        let (tx, _rx) = mpsc::unbounded_channel();
        let raw = MockBackend::with_auto_emit()
            .create_recorder(RecorderInput::Stream(stream.clone()), options(), tx)
            .unwrap();
        assert_eq!(raw.mime_type(), RAW_MEDIA_TYPE);

        let (tx, _rx) = mpsc::unbounded_channel();
        let scripted = MockBackend::new()
            .create_recorder(RecorderInput::Stream(stream), options(), tx)
            .unwrap();
        assert_eq!(scripted.mime_type(), "audio/webm");
    }

    #[test]
    fn manual_scheduler_records_cancellations() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = scheduler
            .request(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(scheduler.tick(), 1);
        scheduler.cancel(handle);
        scheduler.cancel(handle);
        assert_eq!(scheduler.tick(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.cancelled(), vec![handle]);
    }
}
