//! Scribecast Capture Engine
//!
//! Two capture units, one per media type, each owning at most one
//! [`CaptureSession`] at a time:
//!
//! - [`AudioCaptureUnit`] records the microphone and renders a live
//!   frequency visualisation.
//! - [`VideoCaptureUnit`] composites the camera as picture-in-picture over
//!   a free-hand drawing surface and records the composited canvas.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  CaptureSession                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ MediaStream│  │  Recorder  │  │ Frame task │  │
//! │  │  (tracks)  │  │ (chunks)   │  │ (per tick) │  │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  │
//! │        │               │               │         │
//! │        ▼               ▼               ▼         │
//! │   analyser /      ChunkSequence    visualiser /  │
//! │   camera tap      → MediaBlob      compositor    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Device access goes through a [`CaptureBackend`]: [`GstBackend`] for real
//! devices, [`MockBackend`] for tests and dry runs.

pub mod audio;
pub mod backend;
pub mod chunks;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod spectrum;
pub mod video;

pub use audio::AudioCaptureUnit;
pub use backend::{CaptureBackend, GstBackend, MockBackend};
pub use chunks::ChunkSequence;
pub use notify::{NoticeLevel, Notifier, TracingNotifier};
pub use scheduler::{FrameHandle, FrameScheduler, IntervalScheduler};
pub use session::*;
pub use video::VideoCaptureUnit;
