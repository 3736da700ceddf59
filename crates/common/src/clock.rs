//! Session timing.
//!
//! A capture session starts a [`RecordingClock`] when it opens. The CLI reads
//! it back to fill in the runtime of the saved recording.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic time since a session opened, plus the wall-clock start.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RecordingClock {
    /// Anchor a new clock at now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall-clock time the session opened.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Format a duration as `MM:SS`, the way the recording screen shows it.
///
/// Minutes are not wrapped into hours.
pub fn format_mm_ss(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_near_now() {
        let before = Utc::now();
        let clock = RecordingClock::start();
        assert!(clock.elapsed() < Duration::from_secs(1));
        assert!(clock.started_at() >= before);
    }

    #[test]
    fn mm_ss_formatting() {
        assert_eq!(format_mm_ss(Duration::from_secs(0)), "00:00");
        assert_eq!(format_mm_ss(Duration::from_secs(754)), "12:34");
        assert_eq!(format_mm_ss(Duration::from_millis(59_999)), "00:59");
        assert_eq!(format_mm_ss(Duration::from_secs(6000)), "100:00");
    }
}
