use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use scribecast_capture_engine::backend::mock::{ManualScheduler, RecordingNotifier};
use scribecast_capture_engine::{
    AudioCaptureUnit, CaptureContext, CompletionHandler, MockBackend, UnitState, VideoCaptureUnit,
};
use scribecast_common::config::CaptureDefaults;
use scribecast_common::error::DeviceAccessKind;
use scribecast_platform_core::{BoundingRect, MediaBlob, PointerInput, VideoFrame};

struct Harness {
    backend: Arc<MockBackend>,
    scheduler: Arc<ManualScheduler>,
    notifier: Arc<RecordingNotifier>,
    blobs: Arc<Mutex<Vec<MediaBlob>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            backend: Arc::new(MockBackend::new()),
            scheduler: Arc::new(ManualScheduler::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            blobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn context(&self) -> CaptureContext {
        self.context_with(CaptureDefaults::default())
    }

    fn context_with(&self, config: CaptureDefaults) -> CaptureContext {
        CaptureContext::new(
            self.backend.clone(),
            self.scheduler.clone(),
            self.notifier.clone(),
            config,
        )
    }

    fn on_complete(&self) -> CompletionHandler {
        let blobs = self.blobs.clone();
        Arc::new(move |blob| blobs.lock().push(blob))
    }

    fn audio_unit(&self) -> AudioCaptureUnit {
        AudioCaptureUnit::new(self.context(), self.on_complete()).unwrap()
    }

    fn video_unit(&self) -> VideoCaptureUnit {
        VideoCaptureUnit::new(self.context(), self.on_complete()).unwrap()
    }

    fn blobs(&self) -> Vec<MediaBlob> {
        self.blobs.lock().clone()
    }
}

fn mouse(x: f32, y: f32) -> PointerInput {
    PointerInput::Mouse {
        client_x: x,
        client_y: y,
    }
}

fn full_canvas() -> BoundingRect {
    BoundingRect::new(0.0, 0.0, 640.0, 480.0)
}

fn rgba_at(frame: &VideoFrame, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * frame.width + x) * 4) as usize;
    [frame.data[i], frame.data[i + 1], frame.data[i + 2], frame.data[i + 3]]
}

#[tokio::test]
async fn audio_stop_releases_every_acquired_track() {
    let h = Harness::new();
    let mut unit = h.audio_unit();

    unit.start().await.unwrap();
    assert_eq!(unit.state(), UnitState::Capturing);
    unit.stop().await.unwrap();
    assert_eq!(unit.state(), UnitState::Idle);

    let stream = h.backend.last_stream().unwrap();
    assert_eq!(stream.mock_tracks().len(), 1);
    for track in stream.mock_tracks() {
        assert_eq!(track.stop_count(), 1);
    }
}

#[tokio::test]
async fn video_stop_releases_camera_and_microphone() {
    let h = Harness::new();
    let mut unit = h.video_unit();

    unit.start().await.unwrap();
    unit.stop().await.unwrap();

    let stream = h.backend.last_stream().unwrap();
    assert_eq!(stream.mock_tracks().len(), 2);
    assert_eq!(stream.total_stop_calls(), 2);
}

#[tokio::test]
async fn dropping_a_capturing_unit_cleans_up() {
    let h = Harness::new();
    let mut unit = h.audio_unit();
    unit.start().await.unwrap();
    h.backend.last_recorder().unwrap().emit(vec![9u8; 64]);

    drop(unit);

    let stream = h.backend.last_stream().unwrap();
    assert_eq!(stream.total_stop_calls(), 1);
    assert_eq!(h.scheduler.live(), 0);
    assert_eq!(h.scheduler.requested(), h.scheduler.cancelled());

    // The detached collector still delivers what was recorded.
    for _ in 0..10 {
        if !h.blobs().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let blobs = h.blobs();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].size(), 64);
}

#[tokio::test]
async fn dropping_a_capturing_video_unit_cleans_up() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    unit.start().await.unwrap();
    h.scheduler.tick();
    h.backend.last_recorder().unwrap().emit(vec![3u8; 32]);

    drop(unit);

    let stream = h.backend.last_stream().unwrap();
    assert_eq!(stream.total_stop_calls(), 2);
    assert!(stream.all_tracks_stopped());
    assert_eq!(h.scheduler.live(), 0);
    assert_eq!(h.scheduler.requested(), h.scheduler.cancelled());

    for _ in 0..10 {
        if !h.blobs().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let blobs = h.blobs();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].size(), 32);
    assert_eq!(blobs[0].mime_type(), "video/webm");
}

#[tokio::test]
async fn failure_after_acquisition_releases_the_stream() {
    let h = Harness::new();
    let config = CaptureDefaults {
        fft_size: 100,
        ..CaptureDefaults::default()
    };
    let mut unit = AudioCaptureUnit::new(h.context_with(config), h.on_complete()).unwrap();

    assert!(unit.start().await.is_err());
    assert_eq!(unit.state(), UnitState::Idle);
    assert!(!unit.is_capturing());

    let stream = h.backend.last_stream().unwrap();
    assert!(stream.all_tracks_stopped());
    for track in stream.mock_tracks() {
        assert_eq!(track.stop_count(), 1);
    }
    assert!(h.backend.recorders().is_empty());
    assert_eq!(h.scheduler.live(), 0);
    assert_eq!(h.notifier.errors().len(), 1);
    assert!(h.notifier.errors()[0].starts_with("Could not start audio recording"));
    assert!(h.blobs().is_empty());
}

#[tokio::test]
async fn audio_chunks_concatenate_into_one_blob() {
    let h = Harness::new();
    let mut unit = h.audio_unit();
    unit.start().await.unwrap();

    let recorder = h.backend.last_recorder().unwrap();
    assert_eq!(recorder.timeslice(), Some(std::time::Duration::from_millis(1000)));
    recorder.emit(vec![1u8; 1000]);
    recorder.emit(Bytes::new());
    recorder.emit(vec![2u8; 1000]);
    recorder.queue_final(vec![3u8; 500]);

    unit.stop().await.unwrap();

    let blobs = h.blobs();
    assert_eq!(blobs.len(), 1);
    let blob = &blobs[0];
    assert_eq!(blob.size(), 2500);
    assert_eq!(blob.mime_type(), "audio/webm");
    assert_eq!(blob.data()[0], 1);
    assert_eq!(blob.data()[1000], 2);
    assert_eq!(blob.data()[2499], 3);
}

#[tokio::test]
async fn stop_while_idle_is_a_no_op() {
    let h = Harness::new();
    let mut audio = h.audio_unit();
    let mut video = h.video_unit();

    audio.stop().await.unwrap();
    video.stop().await.unwrap();
    audio.start().await.unwrap();
    audio.stop().await.unwrap();
    audio.stop().await.unwrap();

    assert_eq!(h.blobs().len(), 1);
    assert!(h.notifier.notices().is_empty());
    assert_eq!(h.backend.acquisitions(), 1);
}

#[tokio::test]
async fn denied_device_leaves_unit_idle_and_retry_succeeds() {
    let h = Harness::new();
    let mut unit = h.audio_unit();
    h.backend.fail_next_acquire(DeviceAccessKind::PermissionDenied);

    let err = unit.start().await.unwrap_err();
    assert!(err.is_device_access());
    assert_eq!(unit.state(), UnitState::Idle);
    assert!(!unit.is_capturing());
    assert!(h.backend.streams().is_empty());
    assert_eq!(h.notifier.errors().len(), 1);
    assert!(h.notifier.errors()[0].starts_with("Error accessing microphone"));

    unit.start().await.unwrap();
    assert!(unit.is_capturing());
    assert_eq!(h.backend.acquisitions(), 2);
    assert_eq!(h.notifier.errors().len(), 1);
    unit.stop().await.unwrap();
}

#[tokio::test]
async fn busy_camera_is_reported_once() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    h.backend.fail_next_acquire(DeviceAccessKind::Busy);

    assert!(unit.start().await.is_err());
    assert_eq!(unit.state(), UnitState::Idle);
    assert_eq!(h.notifier.errors().len(), 1);
    assert!(h.notifier.errors()[0].starts_with("Error accessing camera"));
    assert!(h.backend.recorders().is_empty());
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let h = Harness::new();
    let mut unit = h.audio_unit();
    unit.start().await.unwrap();
    assert!(unit.start().await.is_err());
    assert_eq!(h.backend.acquisitions(), 1);
    unit.stop().await.unwrap();
}

#[tokio::test]
async fn video_strokes_are_recorded_once() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    unit.start().await.unwrap();
    let rect = full_canvas();

    // First stroke in the default blue.
    assert!(unit.select_color(0));
    assert!(unit.pointer_down(&mouse(100.0, 300.0), &rect));
    assert!(unit.pointer_move(&mouse(200.0, 300.0), &rect));
    assert!(unit.pointer_up());

    // Second stroke in red.
    assert!(unit.select_color(1));
    assert!(unit.pointer_down(&mouse(100.0, 400.0), &rect));
    assert!(unit.pointer_move(&mouse(200.0, 400.0), &rect));
    assert!(unit.pointer_up());

    assert_eq!(h.scheduler.tick(), 1);
    let frame = unit.recording_frame().unwrap();
    assert_eq!((frame.width, frame.height), (640, 480));
    assert_eq!(rgba_at(&frame, 150, 300), [0, 119, 204, 255]);
    assert_eq!(rgba_at(&frame, 150, 400), [0xF4, 0x43, 0x36, 255]);
    assert_eq!(rgba_at(&frame, 50, 200), [255, 255, 255, 255]);

    let recorder = h.backend.last_recorder().unwrap();
    assert!(recorder.is_canvas());
    assert_eq!(recorder.capture_frame(), Some(640 * 480 * 4));

    unit.stop().await.unwrap();
    let blobs = h.blobs();
    assert_eq!(blobs.len(), 1);
    assert!(!blobs[0].is_empty());
    assert_eq!(blobs[0].mime_type(), "video/webm");

    let before = unit.pen_color();
    assert!(!unit.select_color(2));
    assert_eq!(unit.pen_color(), before);
    assert_eq!(h.blobs().len(), 1);
}

#[tokio::test]
async fn camera_overlay_sits_top_right() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    unit.start().await.unwrap();
    let stream = h.backend.last_stream().unwrap();
    stream.push_frame(Some(VideoFrame::solid(320, 240, [10, 200, 30])));

    h.scheduler.tick();
    let frame = unit.recording_frame().unwrap();
    // 25% of 640 wide, 4:3, 10px from the top and right edges.
    assert_eq!(rgba_at(&frame, 640 - 10 - 80, 10 + 60), [10, 200, 30, 255]);
    assert_eq!(rgba_at(&frame, 640 - 10 - 170, 70), [255, 255, 255, 255]);
    assert_eq!(rgba_at(&frame, 600, 200), [255, 255, 255, 255]);

    unit.stop().await.unwrap();
}

#[tokio::test]
async fn missing_camera_frame_composites_drawing_only() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    unit.start().await.unwrap();
    h.backend.last_stream().unwrap().push_frame(None);

    h.scheduler.tick();
    let frame = unit.recording_frame().unwrap();
    assert_eq!(rgba_at(&frame, 630 - 20, 20), [255, 255, 255, 255]);
    unit.stop().await.unwrap();
}

#[tokio::test]
async fn restart_does_not_alter_earlier_recording() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    let rect = full_canvas();

    unit.start().await.unwrap();
    unit.pointer_down(&mouse(10.0, 470.0), &rect);
    unit.pointer_move(&mouse(60.0, 470.0), &rect);
    h.scheduler.tick();
    h.backend.last_recorder().unwrap().capture_frame();
    unit.stop().await.unwrap();
    let first = h.blobs()[0].clone();

    unit.start().await.unwrap();
    assert_eq!(unit.with_surface(|s| s.segments_drawn()), 0);
    unit.pointer_down(&mouse(300.0, 300.0), &rect);
    unit.pointer_move(&mouse(400.0, 350.0), &rect);
    h.scheduler.tick();
    h.backend.last_recorder().unwrap().capture_frame();
    unit.stop().await.unwrap();

    let blobs = h.blobs();
    assert_eq!(blobs.len(), 2);
    assert_eq!(blobs[0], first);
    assert_ne!(blobs[0].data(), blobs[1].data());
}

#[tokio::test]
async fn frame_callbacks_are_cancelled_on_stop() {
    let h = Harness::new();
    let mut unit = h.audio_unit();

    for _ in 0..2 {
        unit.start().await.unwrap();
        h.backend.last_stream().unwrap().push_samples(&[0.5; 256]);
        assert_eq!(h.scheduler.tick(), 1);
        unit.stop().await.unwrap();
    }

    assert_eq!(h.scheduler.requested().len(), 2);
    assert_eq!(h.scheduler.requested(), h.scheduler.cancelled());

    let visualizer = unit.visualizer();
    let drawn = visualizer.lock().frames_rendered();
    assert_eq!(drawn, 2);
    assert_eq!(h.scheduler.tick(), 0);
    assert_eq!(visualizer.lock().frames_rendered(), drawn);
}

#[tokio::test]
async fn pointer_input_is_ignored_while_idle() {
    let h = Harness::new();
    let unit = h.video_unit();
    let rect = full_canvas();

    assert!(!unit.pointer_down(&mouse(10.0, 10.0), &rect));
    assert!(!unit.pointer_move(&mouse(20.0, 20.0), &rect));
    assert!(!unit.select_color(1));
    assert_eq!(unit.with_surface(|s| s.segments_drawn()), 0);
}

#[tokio::test]
async fn touch_and_mouse_draw_the_same_segment() {
    let h = Harness::new();
    let mut unit = h.video_unit();
    unit.start().await.unwrap();
    // Canvas displayed at half size, offset on the page.
    let rect = BoundingRect::new(50.0, 20.0, 320.0, 240.0);

    unit.pointer_down(
        &PointerInput::Touch {
            touches: vec![(60.0, 120.0)],
        },
        &rect,
    );
    unit.pointer_move(
        &PointerInput::Touch {
            touches: vec![(110.0, 120.0)],
        },
        &rect,
    );
    unit.pointer_up();

    let pixel = unit.with_surface(|s| s.pixel(100, 200)).unwrap();
    assert_eq!(pixel, [0, 119, 204, 255]);
    unit.stop().await.unwrap();
}
