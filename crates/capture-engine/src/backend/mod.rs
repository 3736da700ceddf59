use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};

use scribecast_common::error::ScribeResult;
use scribecast_platform_core::{MediaKind, StreamConstraints, TrackState, VideoFrame};

pub mod gst;
pub mod mock;

pub use self::gst::GstBackend;
pub use self::mock::MockBackend;

/// Mono PCM block delivered by an audio tap.
pub type SampleBlock = Arc<[f32]>;

/// Abstract interface for the device capture facilities.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Acquire a device stream matching `constraints`.
    ///
    /// Denied or missing devices are reported as
    /// [`ScribeError::DeviceAccess`](scribecast_common::error::ScribeError::DeviceAccess).
    async fn get_user_media(
        &self,
        constraints: StreamConstraints,
    ) -> ScribeResult<Arc<dyn MediaStream>>;

    /// Build a chunked recorder. Chunks and the final stop notification are
    /// delivered through `events`, in order.
    fn create_recorder(
        &self,
        input: RecorderInput,
        options: RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> ScribeResult<Box<dyn MediaRecorder>>;
}

/// One device track of an acquired stream.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn state(&self) -> TrackState;

    /// Release the device. Stopping an ended track does nothing.
    fn stop(&self);
}

/// A live device stream and its taps.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Subscribe to mono PCM from the audio track, if there is one.
    fn audio_samples(&self) -> Option<broadcast::Receiver<SampleBlock>>;

    /// Latest decoded camera frame, if there is a video track.
    ///
    /// The receiver holds `None` until the camera delivers its first frame.
    fn video_frames(&self) -> Option<watch::Receiver<Option<VideoFrame>>>;

    /// Stop every track. Returns how many tracks were live.
    fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in self.tracks() {
            if track.state() == TrackState::Live {
                stopped += 1;
            }
            track.stop();
        }
        stopped
    }
}

/// Recorder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// What a recorder encodes.
pub enum RecorderInput {
    /// The raw device stream.
    Stream(Arc<dyn MediaStream>),
    /// A canvas sampled as a synthetic video stream.
    Canvas(CanvasCaptureStream),
}

/// A canvas exposed as a fixed-rate video stream.
#[derive(Clone)]
pub struct CanvasCaptureStream {
    frames: watch::Receiver<Option<VideoFrame>>,
    width: u32,
    height: u32,
    fps: u32,
}

impl CanvasCaptureStream {
    pub fn new(
        frames: watch::Receiver<Option<VideoFrame>>,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Self {
        Self {
            frames,
            width,
            height,
            fps: fps.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    /// Most recently composited frame.
    pub fn latest(&self) -> Option<VideoFrame> {
        self.frames.borrow().clone()
    }

    /// Whether the compositing side has gone away.
    pub fn is_closed(&self) -> bool {
        self.frames.has_changed().is_err()
    }
}

/// Recorder construction parameters.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Container type of the emitted chunks.
    pub mime_type: String,
    /// Sample rate of the audio input, for stream recorders.
    pub audio_sample_rate: u32,
}

/// Notifications delivered by a recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// A time-sliced chunk of encoded media. May be empty.
    DataAvailable(Bytes),
    /// The recorder stopped; no events follow.
    Stopped,
    /// A non-fatal encoder problem.
    Error(String),
}

/// A chunked media recorder.
pub trait MediaRecorder: Send {
    /// Begin recording, emitting a chunk every `timeslice`.
    fn start(&mut self, timeslice: Duration) -> ScribeResult<()>;

    /// Stop recording. Emits the final chunk, then [`RecorderEvent::Stopped`].
    /// Does nothing when inactive.
    fn stop(&mut self) -> ScribeResult<()>;

    fn state(&self) -> RecorderState;

    fn mime_type(&self) -> &str;
}
