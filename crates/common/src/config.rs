//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture and rendering parameters.
    #[serde(default)]
    pub capture: CaptureDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional JSON file used to seed the content library.
    #[serde(default)]
    pub library_seed: Option<PathBuf>,
}

/// Fixed parameters of the capture units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Interval between recorder chunk emissions, in milliseconds.
    pub timeslice_ms: u64,

    /// FFT window of the audio analyser. Bucket count is half of this.
    pub fft_size: usize,

    /// Audio visualiser canvas size.
    pub visualizer_width: u32,
    pub visualizer_height: u32,

    /// Drawing surface and recording canvas size.
    pub canvas_width: u32,
    pub canvas_height: u32,

    /// Frame rate of the synthetic canvas stream.
    pub capture_fps: u32,

    /// Animation tick rate (display refresh).
    pub refresh_hz: u32,

    /// Picture-in-picture width as a fraction of the canvas width.
    pub pip_width_ratio: f32,

    /// Picture-in-picture distance from the top and right edges, in pixels.
    pub pip_margin: f32,

    /// Pen width in pixels.
    pub stroke_width: f32,

    /// Pen colours offered to the user, as `#RRGGBB`.
    pub palette: Vec<String>,

    /// Media type tagged on audio blobs.
    pub audio_mime_type: String,

    /// Media type tagged on video blobs.
    pub video_mime_type: String,

    /// Sample rate requested from the microphone.
    pub audio_sample_rate: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "scribecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureDefaults::default(),
            logging: LoggingConfig::default(),
            library_seed: None,
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            timeslice_ms: 1000,
            fft_size: 256,
            visualizer_width: 600,
            visualizer_height: 80,
            canvas_width: 640,
            canvas_height: 480,
            capture_fps: 30,
            refresh_hz: 60,
            pip_width_ratio: 0.25,
            pip_margin: 10.0,
            stroke_width: 3.0,
            palette: ["#0077CC", "#F44336", "#4CAF50", "#000000"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            audio_mime_type: "audio/webm".to_string(),
            video_mime_type: "video/webm".to_string(),
            audio_sample_rate: 48000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CaptureDefaults {
    /// Recorder emit interval.
    pub fn timeslice(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeslice_ms.max(1))
    }

    /// Number of frequency buckets the analyser exposes.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("scribecast").join("config.json")
}
