//! GStreamer device backend.
//!
//! Microphone and camera streams are `autoaudiosrc` / `autovideosrc`
//! pipelines ending in an `appsink` tap. Recorders are `appsrc` pipelines
//! muxing into WebM, with the muxed output collected from an `appsink` and
//! handed out once per timeslice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use gstreamer as gst;
use gstreamer_app as gst_app;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use scribecast_common::error::{ScribeError, ScribeResult};
use scribecast_platform_core::{MediaKind, StreamConstraints, TrackState, VideoFrame};

use super::{
    CaptureBackend, MediaRecorder, MediaStream, MediaTrack, RecorderEvent, RecorderInput,
    RecorderOptions, RecorderState, SampleBlock,
};
use crate::pipeline::{missing_elements, pcm_caps, rgba_caps, GstPipeline};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Capture backend built on GStreamer device sources.
#[derive(Debug, Clone)]
pub struct GstBackend {
    sample_rate: u32,
}

impl GstBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Elements this backend needs that are not installed.
    pub fn missing_elements(&self) -> ScribeResult<Vec<&'static str>> {
        missing_elements()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    async fn get_user_media(
        &self,
        constraints: StreamConstraints,
    ) -> ScribeResult<Arc<dyn MediaStream>> {
        if constraints.kinds().is_empty() {
            return Err(ScribeError::capture(
                "At least one of audio or video must be requested",
            ));
        }
        let sample_rate = self.sample_rate;

        // Reaching Playing waits on the device, which can block for seconds.
        let stream = tokio::task::spawn_blocking(move || open_stream(constraints, sample_rate))
            .await
            .map_err(|e| ScribeError::capture(format!("Device open task failed: {e}")))??;

        tracing::info!(
            stream = %stream.id,
            tracks = stream.tracks.len(),
            "Device stream acquired"
        );
        Ok(Arc::new(stream))
    }

    fn create_recorder(
        &self,
        input: RecorderInput,
        options: RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> ScribeResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(GstRecorder {
            id: format!("recorder-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            input,
            options,
            events,
            state: RecorderState::Inactive,
            pipeline: None,
            src: None,
            pending: Arc::new(Mutex::new(BytesMut::new())),
            feeder: None,
            emitter: None,
        }))
    }
}

fn open_stream(constraints: StreamConstraints, sample_rate: u32) -> ScribeResult<GstStream> {
    let mut stream = GstStream {
        id: format!("stream-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        tracks: Vec::new(),
        audio: None,
        video: None,
    };

    if constraints.audio {
        let (tx, _) = broadcast::channel(64);
        let pipeline = open_microphone(sample_rate, tx.clone())?;
        stream.tracks.push(Arc::new(GstTrack::new(MediaKind::Audio, pipeline)));
        stream.audio = Some(tx);
    }

    if constraints.video {
        let tx = Arc::new(watch::channel(None).0);
        let pipeline = open_camera(tx.clone())?;
        stream.tracks.push(Arc::new(GstTrack::new(MediaKind::Video, pipeline)));
        stream.video = Some(tx);
    }

    Ok(stream)
}

fn open_microphone(
    sample_rate: u32,
    samples: broadcast::Sender<SampleBlock>,
) -> ScribeResult<GstPipeline> {
    let launch = format!(
        "autoaudiosrc name=mic ! audioconvert ! audioresample ! {} ! appsink name=tap sync=false",
        pcm_caps(sample_rate)
    );
    let mut pipeline = GstPipeline::from_launch("microphone", &launch)?;

    pipeline.app_sink("tap")?.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                let block: Vec<f32> = map
                    .as_slice()
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                // No subscribers is fine; the analyser may not be attached yet.
                let _ = samples.send(SampleBlock::from(block));
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    pipeline.start()?;
    Ok(pipeline)
}

fn open_camera(frames: Arc<watch::Sender<Option<VideoFrame>>>) -> ScribeResult<GstPipeline> {
    let launch = "autovideosrc name=camera ! videoconvert ! video/x-raw,format=RGBA \
                  ! appsink name=tap sync=false max-buffers=1 drop=true";
    let mut pipeline = GstPipeline::from_launch("camera", launch)?;

    pipeline.app_sink("tap")?.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                let structure = caps.structure(0).ok_or(gst::FlowError::Error)?;
                let width = structure
                    .get::<i32>("width")
                    .map_err(|_| gst::FlowError::NotNegotiated)?;
                let height = structure
                    .get::<i32>("height")
                    .map_err(|_| gst::FlowError::NotNegotiated)?;

                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                let frame = VideoFrame::new(
                    width as u32,
                    height as u32,
                    Bytes::copy_from_slice(map.as_slice()),
                );
                if frame.is_well_formed() {
                    frames.send_replace(Some(frame));
                } else {
                    tracing::trace!(width, height, "Dropping padded camera frame");
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    pipeline.start()?;
    Ok(pipeline)
}

struct GstTrack {
    id: String,
    kind: MediaKind,
    pipeline: Mutex<Option<GstPipeline>>,
}

impl GstTrack {
    fn new(kind: MediaKind, pipeline: GstPipeline) -> Self {
        Self {
            id: format!("{}-{}", pipeline.name(), NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            pipeline: Mutex::new(Some(pipeline)),
        }
    }
}

impl MediaTrack for GstTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn state(&self) -> TrackState {
        if self.pipeline.lock().is_some() {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    fn stop(&self) {
        if let Some(mut pipeline) = self.pipeline.lock().take() {
            if let Err(e) = pipeline.shutdown() {
                tracing::warn!(track = %self.id, error = %e, "Failed to release device");
            } else {
                tracing::debug!(track = %self.id, "Device released");
            }
        }
    }
}

struct GstStream {
    id: String,
    tracks: Vec<Arc<GstTrack>>,
    audio: Option<broadcast::Sender<SampleBlock>>,
    video: Option<Arc<watch::Sender<Option<VideoFrame>>>>,
}

impl MediaStream for GstStream {
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

struct GstRecorder {
    id: String,
    input: RecorderInput,
    options: RecorderOptions,
    events: mpsc::UnboundedSender<RecorderEvent>,
    state: RecorderState,
    pipeline: Option<GstPipeline>,
    src: Option<gst_app::AppSrc>,
    pending: Arc<Mutex<BytesMut>>,
    feeder: Option<JoinHandle<()>>,
    emitter: Option<JoinHandle<()>>,
}

impl GstRecorder {
    fn launch_line(&self) -> (&'static str, String) {
        match &self.input {
            RecorderInput::Stream(_) => (
                "audio recorder",
                "appsrc name=src is-live=true format=time do-timestamp=true \
                 ! queue ! audioconvert ! audioresample ! opusenc \
                 ! webmmux streamable=true ! appsink name=sink sync=false"
                    .to_string(),
            ),
            RecorderInput::Canvas(_) => (
                "canvas recorder",
                "appsrc name=src is-live=true format=time do-timestamp=true \
                 ! queue ! videoconvert ! vp8enc deadline=1 \
                 ! webmmux streamable=true ! appsink name=sink sync=false"
                    .to_string(),
            ),
        }
    }

    fn input_caps(&self) -> String {
        match &self.input {
            RecorderInput::Stream(_) => pcm_caps(self.options.audio_sample_rate),
            RecorderInput::Canvas(canvas) => {
                rgba_caps(canvas.width(), canvas.height(), canvas.fps())
            }
        }
    }

    fn spawn_feeder(
        &self,
        runtime: &tokio::runtime::Handle,
        src: gst_app::AppSrc,
    ) -> ScribeResult<JoinHandle<()>> {
        match &self.input {
            RecorderInput::Stream(stream) => {
                let mut samples = stream.audio_samples().ok_or_else(|| {
                    ScribeError::recorder("Recorded stream has no audio track")
                })?;
                Ok(runtime.spawn(async move {
                    loop {
                        match samples.recv().await {
                            Ok(block) => {
                                let mut bytes = Vec::with_capacity(block.len() * 4);
                                for sample in block.iter() {
                                    bytes.extend_from_slice(&sample.to_le_bytes());
                                }
                                if src.push_buffer(gst::Buffer::from_mut_slice(bytes)).is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Audio recorder dropped PCM blocks");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }))
            }
            RecorderInput::Canvas(canvas) => {
                let canvas = canvas.clone();
                Ok(runtime.spawn(async move {
                    let mut ticker = tokio::time::interval(canvas.frame_interval());
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        if canvas.is_closed() {
                            break;
                        }
                        let Some(frame) = canvas.latest() else {
                            continue;
                        };
                        if frame.width != canvas.width() || frame.height != canvas.height() {
                            continue;
                        }
                        if src.push_buffer(gst::Buffer::from_slice(frame.data)).is_err() {
                            break;
                        }
                    }
                }))
            }
        }
    }

    fn spawn_emitter(
        &self,
        runtime: &tokio::runtime::Handle,
        timeslice: Duration,
    ) -> JoinHandle<()> {
        let pending = self.pending.clone();
        let events = self.events.clone();
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let chunk = std::mem::take(&mut *pending.lock()).freeze();
                if events.send(RecorderEvent::DataAvailable(chunk)).is_err() {
                    break;
                }
            }
        })
    }

    fn abort_tasks(&mut self) {
        for task in [self.feeder.take(), self.emitter.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl MediaRecorder for GstRecorder {
    fn start(&mut self, timeslice: Duration) -> ScribeResult<()> {
        if self.state == RecorderState::Recording {
            return Err(ScribeError::invalid_state("Recorder is already recording"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ScribeError::recorder("Recorder requires a running tokio runtime"))?;

        let (name, launch) = self.launch_line();
        let mut pipeline = GstPipeline::from_launch(name, &launch)?;

        let caps: gst::Caps = self
            .input_caps()
            .parse()
            .map_err(|e| ScribeError::recorder(format!("Invalid recorder caps: {e}")))?;
        let src = pipeline.app_src("src")?;
        src.set_caps(Some(&caps));

        let pending = self.pending.clone();
        pipeline.app_sink("sink")?.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    pending.lock().extend_from_slice(map.as_slice());
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.start()?;
        self.feeder = Some(self.spawn_feeder(&runtime, src.clone())?);
        self.emitter = Some(self.spawn_emitter(&runtime, timeslice));
        self.pipeline = Some(pipeline);
        self.src = Some(src);
        self.state = RecorderState::Recording;

        tracing::info!(
            recorder = %self.id,
            mime_type = %self.options.mime_type,
            timeslice_ms = timeslice.as_millis() as u64,
            "Recorder started"
        );
        Ok(())
    }

    fn stop(&mut self) -> ScribeResult<()> {
        if self.state == RecorderState::Inactive {
            return Ok(());
        }
        self.state = RecorderState::Inactive;
        self.abort_tasks();

        if let Some(src) = self.src.take() {
            if let Err(e) = src.end_of_stream() {
                tracing::debug!(recorder = %self.id, error = ?e, "appsrc rejected EOS");
            }
        }
        let drained = match self.pipeline.take() {
            Some(mut pipeline) => pipeline.stop(),
            None => Ok(()),
        };

        let last = std::mem::take(&mut *self.pending.lock()).freeze();
        let _ = self.events.send(RecorderEvent::DataAvailable(last));
        let _ = self.events.send(RecorderEvent::Stopped);
        tracing::info!(recorder = %self.id, "Recorder stopped");

        drained
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn mime_type(&self) -> &str {
        &self.options.mime_type
    }
}

impl Drop for GstRecorder {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
