//! GStreamer pipeline wrapper shared by the device streams and recorders.

use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use scribecast_common::error::{DeviceAccessKind, ScribeError, ScribeResult};

/// How long to wait for state changes and EOS drains.
const STATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Elements the device streams and recorders rely on.
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "autoaudiosrc",
    "autovideosrc",
    "audioconvert",
    "audioresample",
    "videoconvert",
    "opusenc",
    "vp8enc",
    "webmmux",
    "appsrc",
    "appsink",
];

/// A launched GStreamer pipeline.
pub struct GstPipeline {
    name: String,
    pipeline: gst::Pipeline,
}

impl GstPipeline {
    pub fn from_launch(name: impl Into<String>, launch: &str) -> ScribeResult<Self> {
        init_gstreamer()?;
        let name = name.into();

        let element = gst::parse::launch(launch)
            .map_err(|e| ScribeError::capture(format!("Failed to build {name} pipeline: {e}")))?;

        let pipeline = element.dynamic_cast::<gst::Pipeline>().map_err(|_| {
            ScribeError::capture(format!("Launch string for {name} did not produce a pipeline"))
        })?;

        Ok(Self { name, pipeline })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a named `appsink`.
    pub fn app_sink(&self, element: &str) -> ScribeResult<gst_app::AppSink> {
        self.pipeline
            .by_name(element)
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| {
                ScribeError::capture(format!("{} pipeline has no appsink '{element}'", self.name))
            })
    }

    /// Look up a named `appsrc`.
    pub fn app_src(&self, element: &str) -> ScribeResult<gst_app::AppSrc> {
        self.pipeline
            .by_name(element)
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| {
                ScribeError::capture(format!("{} pipeline has no appsrc '{element}'", self.name))
            })
    }

    /// Set the pipeline to Playing and wait until it gets there.
    ///
    /// Failures carry the first error posted on the bus, so a missing or
    /// refused device is reported as a device-access error.
    pub fn start(&mut self) -> ScribeResult<()> {
        if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
            let _ = self.pipeline.set_state(gst::State::Null);
            return Err(self.bus_error().unwrap_or_else(|| {
                ScribeError::capture(format!("Failed to start {} pipeline: {e:?}", self.name))
            }));
        }

        // State changes are async; without this wait a device source may
        // not have opened yet when we return.
        match self.pipeline.state(clock_time(STATE_TIMEOUT)) {
            (Ok(_), gst::State::Playing, _) => Ok(()),
            (Ok(_), state, _) => {
                tracing::warn!(
                    pipeline = %self.name,
                    ?state,
                    "Pipeline did not reach Playing state within timeout"
                );
                Ok(())
            }
            (Err(e), _, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                Err(self.bus_error().unwrap_or_else(|| {
                    ScribeError::capture(format!(
                        "{} pipeline failed to reach Playing state: {e:?}",
                        self.name
                    ))
                }))
            }
        }
    }

    /// Send EOS, wait for it to drain through the muxer, then tear down.
    pub fn stop(&mut self) -> ScribeResult<()> {
        if !self.pipeline.send_event(gst::event::Eos::new()) {
            tracing::warn!(pipeline = %self.name, "Failed to send EOS event; output may be truncated");
        } else if let Some(bus) = self.pipeline.bus() {
            let start = std::time::Instant::now();
            loop {
                let elapsed = start.elapsed();
                if elapsed >= STATE_TIMEOUT {
                    tracing::warn!(pipeline = %self.name, "EOS drain timed out");
                    break;
                }
                match bus.timed_pop(clock_time(STATE_TIMEOUT - elapsed)) {
                    Some(msg) => match msg.view() {
                        gst::MessageView::Eos(_) => {
                            tracing::debug!(pipeline = %self.name, "EOS received; pipeline drained");
                            break;
                        }
                        gst::MessageView::Error(e) => {
                            tracing::warn!(
                                pipeline = %self.name,
                                error = %e.error(),
                                "Pipeline error during EOS drain"
                            );
                            break;
                        }
                        _ => {}
                    },
                    None => {
                        tracing::warn!(pipeline = %self.name, "EOS drain timed out");
                        break;
                    }
                }
            }
        }
        self.shutdown()
    }

    /// Tear down immediately, without draining.
    pub fn shutdown(&mut self) -> ScribeResult<()> {
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            ScribeError::capture(format!("Failed to stop {} pipeline: {e:?}", self.name))
        })?;
        Ok(())
    }

    fn bus_error(&self) -> Option<ScribeError> {
        let bus = self.pipeline.bus()?;
        let msg = bus.timed_pop_filtered(gst::ClockTime::ZERO, &[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(e) => {
                let error = e.error();
                Some(ScribeError::device_access(
                    classify_resource_error(&error),
                    format!("{}: {error}", self.name),
                ))
            }
            _ => None,
        }
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn classify_resource_error(error: &gst::glib::Error) -> DeviceAccessKind {
    if error.matches(gst::ResourceError::NotAuthorized) {
        DeviceAccessKind::PermissionDenied
    } else if error.matches(gst::ResourceError::Busy) {
        DeviceAccessKind::Busy
    } else if error.matches(gst::ResourceError::NotFound)
        || error.matches(gst::ResourceError::OpenRead)
        || error.matches(gst::ResourceError::OpenReadWrite)
    {
        DeviceAccessKind::NotFound
    } else {
        DeviceAccessKind::Other
    }
}

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(duration.as_nanos() as u64)
}

pub(crate) fn init_gstreamer() -> ScribeResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(ScribeError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Names from [`REQUIRED_ELEMENTS`] with no registered factory.
pub fn missing_elements() -> ScribeResult<Vec<&'static str>> {
    init_gstreamer()?;
    Ok(REQUIRED_ELEMENTS
        .iter()
        .copied()
        .filter(|name| gst::ElementFactory::find(name).is_none())
        .collect())
}

/// Caps fragment for mono interleaved float PCM.
pub fn pcm_caps(sample_rate: u32) -> String {
    format!("audio/x-raw,format=F32LE,layout=interleaved,channels=1,rate={sample_rate}")
}

/// Caps fragment for raw RGBA video at a fixed rate.
pub fn rgba_caps(width: u32, height: u32, fps: u32) -> String {
    format!("video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1")
}
