//! Scribecast CLI: record audio or annotated video and file it into the
//! content library.
//!
//! Usage:
//!   scribecast record audio [OPTIONS]   Record the microphone
//!   scribecast record video [OPTIONS]   Record the camera over a drawing surface
//!   scribecast library <ACTION>         Browse the content library
//!   scribecast check                    Check capture capabilities
//!   scribecast config [--save]          Show or write the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use scribecast_common::config::AppConfig;
use scribecast_content_model::RecordingKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "scribecast",
    about = "Audio and annotated-video recorder with a content library",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaArg {
    Audio,
    Video,
}

impl From<MediaArg> for RecordingKind {
    fn from(arg: MediaArg) -> Self {
        match arg {
            MediaArg::Audio => RecordingKind::Audio,
            MediaArg::Video => RecordingKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Real devices through GStreamer
    Gst,
    /// Synthetic devices, no hardware needed
    Mock,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl+C or the given duration
    Record {
        /// What to record
        #[arg(value_enum)]
        kind: MediaArg,

        /// Recording name, also the output file stem
        #[arg(short, long, default_value = "recording")]
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Capture backend
        #[arg(long, value_enum, default_value = "gst")]
        backend: BackendArg,

        /// JSON stroke script replayed onto the drawing surface (video only)
        #[arg(long)]
        strokes: Option<PathBuf>,
    },

    /// Browse the content library
    Library {
        #[command(subcommand)]
        action: commands::library::LibraryAction,
    },

    /// Check capture capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    scribecast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            kind,
            name,
            output,
            duration,
            backend,
            strokes,
        } => {
            commands::record::run(commands::record::RecordOptions {
                kind: kind.into(),
                name,
                output,
                duration,
                backend,
                strokes,
                config,
            })
            .await
        }
        Commands::Library { action } => commands::library::run(action, &config),
        Commands::Check => commands::check::run(&config),
        Commands::Config { save } => commands::config::run(&config, save),
    }
}
