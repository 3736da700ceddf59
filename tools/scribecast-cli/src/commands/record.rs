//! Run one recording: start a capture unit, wait, stop, write the blob and
//! file it into the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::mpsc;

use scribecast_capture_engine::backend::mock::RAW_MEDIA_TYPE;
use scribecast_capture_engine::backend::CaptureBackend;
use scribecast_capture_engine::{
    AudioCaptureUnit, CaptureContext, CompletionHandler, GstBackend, IntervalScheduler,
    MockBackend, NoticeLevel, Notifier, TracingNotifier, VideoCaptureUnit,
};
use scribecast_common::clock::format_mm_ss;
use scribecast_common::config::AppConfig;
use scribecast_content_model::{ContentLibrary, ContentNode, RecordingEntry, RecordingKind};
use scribecast_platform_core::{BoundingRect, MediaBlob, PointerInput};

use crate::BackendArg;

pub struct RecordOptions {
    pub kind: RecordingKind,
    pub name: String,
    pub output: PathBuf,
    pub duration: Option<f64>,
    pub backend: BackendArg,
    pub strokes: Option<PathBuf>,
    pub config: AppConfig,
}

/// Prints notices to the terminal and logs them.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        TracingNotifier.notify(level, message);
        match level {
            NoticeLevel::Info => println!("  {message}"),
            NoticeLevel::Success => println!("[OK] {message}"),
            NoticeLevel::Error => eprintln!("[ERROR] {message}"),
        }
    }
}

/// One step of a stroke script, in canvas pixels.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StrokeAction {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Color { index: usize },
}

#[derive(Debug, Deserialize)]
struct StrokeEvent {
    /// Offset from recording start.
    at_ms: u64,
    #[serde(flatten)]
    action: StrokeAction,
}

fn load_strokes(path: &Path) -> anyhow::Result<Vec<StrokeEvent>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading stroke script {}", path.display()))?;
    let mut events: Vec<StrokeEvent> = serde_json::from_str(&json)
        .with_context(|| format!("parsing stroke script {}", path.display()))?;
    events.sort_by_key(|e| e.at_ms);
    Ok(events)
}

pub async fn run(opts: RecordOptions) -> anyhow::Result<()> {
    let capture = opts.config.capture.clone();
    let strokes = match &opts.strokes {
        Some(path) if opts.kind == RecordingKind::Video => load_strokes(path)?,
        Some(_) => anyhow::bail!("--strokes only applies to video recordings"),
        None => Vec::new(),
    };

    println!("Starting {} recording: {}", opts.kind.label().to_lowercase(), opts.name);
    println!("  Output: {}", opts.output.display());
    println!("  Backend: {:?}", opts.backend);
    if let Some(secs) = opts.duration {
        println!("  Duration: {secs}s");
    }
    println!();

    let mock = Arc::new(MockBackend::with_auto_emit());
    let backend: Arc<dyn CaptureBackend> = match opts.backend {
        BackendArg::Gst => Arc::new(GstBackend::new(capture.audio_sample_rate)),
        BackendArg::Mock => mock.clone(),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let ctx = CaptureContext::new(
        backend,
        Arc::new(IntervalScheduler::new(capture.refresh_hz)),
        notifier.clone(),
        capture.clone(),
    );

    let (blob_tx, mut blob_rx) = mpsc::unbounded_channel::<MediaBlob>();
    let on_complete: CompletionHandler = Arc::new(move |blob| {
        let _ = blob_tx.send(blob);
    });

    let elapsed = match opts.kind {
        RecordingKind::Audio => {
            let mut unit = AudioCaptureUnit::new(ctx, on_complete)?;
            unit.start().await?;
            notifier.info("Audio recording started");
            let tone = (opts.backend == BackendArg::Mock)
                .then(|| spawn_test_tone(mock.clone(), capture.audio_sample_rate));

            wait_for_stop(opts.duration).await?;
            let elapsed = unit.session().map(|s| s.elapsed()).unwrap_or_default();
            unit.stop().await?;
            if let Some(tone) = tone {
                tone.abort();
            }
            elapsed
        }
        RecordingKind::Video => {
            let mut unit = VideoCaptureUnit::new(ctx, on_complete)?;
            unit.start().await?;
            notifier.info("Video recording started");

            let rect = BoundingRect::new(
                0.0,
                0.0,
                capture.canvas_width as f32,
                capture.canvas_height as f32,
            );
            tokio::select! {
                result = replay_strokes(&unit, &strokes, &rect) => {
                    result?;
                    wait_for_stop(opts.duration.map(|d| {
                        let replayed = strokes.last().map_or(0.0, |e| e.at_ms as f64 / 1000.0);
                        (d - replayed).max(0.0)
                    }))
                    .await?;
                }
                result = wait_for_stop(opts.duration) => result?,
            }

            let elapsed = unit.session().map(|s| s.elapsed()).unwrap_or_default();
            unit.stop().await?;
            elapsed
        }
    };

    let Ok(blob) = blob_rx.try_recv() else {
        notifier.error("No recording available to save");
        anyhow::bail!("recorder finished without producing a recording");
    };
    save_recording(&opts, blob, elapsed, notifier.as_ref())
}

/// Block until Ctrl+C, or until `duration` seconds have passed.
async fn wait_for_stop(duration: Option<f64>) -> anyhow::Result<()> {
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            println!("Press Ctrl+C to stop recording...");
            tokio::signal::ctrl_c().await?;
        }
    }
    println!();
    Ok(())
}

async fn replay_strokes(
    unit: &VideoCaptureUnit,
    events: &[StrokeEvent],
    rect: &BoundingRect,
) -> anyhow::Result<()> {
    let start = tokio::time::Instant::now();
    for event in events {
        tokio::time::sleep_until(start + Duration::from_millis(event.at_ms)).await;
        let pointer = |x: f32, y: f32| PointerInput::Mouse {
            client_x: x,
            client_y: y,
        };
        match event.action {
            StrokeAction::Down { x, y } => {
                unit.pointer_down(&pointer(x, y), rect);
            }
            StrokeAction::Move { x, y } => {
                unit.pointer_move(&pointer(x, y), rect);
            }
            StrokeAction::Up => {
                unit.pointer_up();
            }
            StrokeAction::Color { index } => {
                if !unit.select_color(index) {
                    tracing::warn!(index, "Stroke script selects a colour outside the palette");
                }
            }
        }
    }
    tracing::debug!(events = events.len(), "Stroke script replayed");
    Ok(())
}

/// Feed a 440 Hz tone into the mock microphone.
fn spawn_test_tone(mock: Arc<MockBackend>, sample_rate: u32) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let block = (sample_rate / 50).max(1) as usize;
        let step = 2.0 * std::f32::consts::PI * 440.0 / sample_rate as f32;
        let mut phase = 0.0f32;
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        loop {
            ticker.tick().await;
            let Some(stream) = mock.last_stream() else {
                continue;
            };
            let samples: Vec<f32> = (0..block)
                .map(|_| {
                    phase = (phase + step) % (2.0 * std::f32::consts::PI);
                    0.3 * phase.sin()
                })
                .collect();
            stream.push_samples(&samples);
        }
    })
}

fn save_recording(
    opts: &RecordOptions,
    blob: MediaBlob,
    elapsed: Duration,
    notifier: &dyn Notifier,
) -> anyhow::Result<()> {
    if blob.is_empty() {
        tracing::warn!("Recording is empty");
    }

    std::fs::create_dir_all(&opts.output)
        .with_context(|| format!("creating {}", opts.output.display()))?;
    let file_name = format!("{}.{}", opts.name, blob.extension());
    let path = opts.output.join(&file_name);
    std::fs::write(&path, blob.data()).with_context(|| format!("writing {}", path.display()))?;

    let runtime = format_mm_ss(elapsed);
    println!("Recording saved to: {}", path.display());
    println!("  Type: {}", blob.mime_type());
    println!("  Size: {} bytes", blob.size());
    println!("  Duration: {runtime}");

    if blob.mime_type() == RAW_MEDIA_TYPE {
        println!("  Note: mock backend output is raw samples, not a playable file");
    }

    let mut library = super::load_library(&opts.config)?;
    let folder_id = file_recording(
        &mut library,
        opts.kind,
        &opts.name,
        &file_name,
        &path,
        runtime,
        chrono::Local::now().date_naive(),
    )?;
    print_library_update(&library, opts.kind.library_category(), folder_id);
    notifier.success("Recording completed successfully");
    Ok(())
}

/// Add the saved file under "My Recordings" in its category and prepend a
/// history entry. Returns the folder id.
fn file_recording(
    library: &mut ContentLibrary,
    kind: RecordingKind,
    name: &str,
    file_name: &str,
    path: &Path,
    runtime: String,
    date: chrono::NaiveDate,
) -> anyhow::Result<u64> {
    let id = library.next_id();
    let node = ContentNode::file(id, file_name)
        .with_description(format!("{} recording", kind.label()))
        .with_href(path.display().to_string())
        .with_runtime(runtime.clone());
    let folder_id = library.add_recording(kind.library_category(), node)?;
    library.record_history(RecordingEntry::new(id, name, kind, date, runtime));
    Ok(folder_id)
}

/// Show the folder the recording was filed into and the new history entry.
fn print_library_update(library: &ContentLibrary, category: &str, folder_id: u64) {
    let Some(folder) = library.find(folder_id) else {
        return;
    };
    println!("  Library: {category} / {}", folder.name);
    for file in &folder.children {
        let runtime = file.runtime.as_deref().unwrap_or("-");
        println!("    [{}] {} ({runtime})", file.id, file.name);
    }
    if let Some(entry) = library.history().first() {
        println!(
            "  History: {} {} {} {}",
            entry.kind.label(),
            entry.name,
            entry.date,
            entry.duration
        );
    }
}
