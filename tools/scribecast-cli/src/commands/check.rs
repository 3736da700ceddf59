//! Check capture capabilities.

use scribecast_capture_engine::pipeline::{missing_elements, REQUIRED_ELEMENTS};
use scribecast_common::config::{config_file_path, AppConfig};
use scribecast_render_engine::Palette;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Scribecast System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not found)", config_path.display());
    }

    let mut ready = true;
    match missing_elements() {
        Ok(missing) if missing.is_empty() => {
            println!(
                "[OK] GStreamer elements: all {} available",
                REQUIRED_ELEMENTS.len()
            );
        }
        Ok(missing) => {
            ready = false;
            println!("[FAIL] GStreamer elements missing: {}", missing.join(", "));
            println!("       Install the gst-plugins-base/good packages for your system.");
        }
        Err(e) => {
            ready = false;
            println!("[FAIL] GStreamer: {e}");
        }
    }

    let capture = &config.capture;
    println!(
        "[OK] Canvas: {}x{} @ {} fps, visualiser {}x{}",
        capture.canvas_width,
        capture.canvas_height,
        capture.capture_fps,
        capture.visualizer_width,
        capture.visualizer_height
    );
    println!(
        "[OK] Recorder: {} ms chunks, {} / {}",
        capture.timeslice_ms, capture.audio_mime_type, capture.video_mime_type
    );
    match Palette::from_hex(&capture.palette) {
        Ok(palette) => {
            let swatches: Vec<String> = palette.colors().iter().map(|c| c.to_hex()).collect();
            println!("[OK] Palette: {}", swatches.join(" "));
        }
        Err(e) => {
            ready = false;
            println!("[FAIL] Palette: {e}");
        }
    }

    println!();
    if ready {
        println!("All required capabilities are available. Scribecast is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
    Ok(())
}
