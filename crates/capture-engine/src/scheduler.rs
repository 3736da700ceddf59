//! Display-refresh-driven frame scheduling.
//!
//! Animation work is registered once and runs every tick until its handle
//! is cancelled. The handle lives on the capture session, which cancels it
//! when the session closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use scribecast_common::error::{ScribeError, ScribeResult};

/// Work run once per animation tick.
pub type FrameCallback = Box<dyn FnMut() + Send + 'static>;

/// Identifies a registered frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Runs callbacks at the display refresh cadence.
pub trait FrameScheduler: Send + Sync {
    /// Register `callback` to run on every tick until cancelled.
    fn request(&self, callback: FrameCallback) -> ScribeResult<FrameHandle>;

    /// Stop running the callback behind `handle`. No tick starts after this
    /// returns. Unknown handles are ignored.
    fn cancel(&self, handle: FrameHandle);
}

/// A [`FrameScheduler`] backed by one tokio interval task per callback.
pub struct IntervalScheduler {
    period: Duration,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new(refresh_hz: u32) -> Self {
        let hz = refresh_hz.max(1) as u64;
        Self {
            period: Duration::from_nanos(1_000_000_000 / hz),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Callbacks currently scheduled.
    pub fn active(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl FrameScheduler for IntervalScheduler {
    fn request(&self, mut callback: FrameCallback) -> ScribeResult<FrameHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ScribeError::invalid_state("Frame scheduling requires a running tokio runtime")
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let period = self.period;
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                callback();
            }
        });

        self.tasks.lock().insert(id, task);
        tracing::trace!(handle = id, ?period, "Frame callback scheduled");
        Ok(FrameHandle(id))
    }

    fn cancel(&self, handle: FrameHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle.0) {
            task.abort();
            tracing::trace!(handle = handle.0, "Frame callback cancelled");
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn request_outside_runtime_fails() {
        let scheduler = IntervalScheduler::new(60);
        assert!(scheduler.request(Box::new(|| {})).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_cancelled() {
        let scheduler = IntervalScheduler::new(100);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let handle = scheduler
            .request(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 5);

        scheduler.cancel(handle);
        assert_eq!(scheduler.active(), 0);
        tokio::task::yield_now().await;
        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn period_follows_refresh_rate() {
        assert_eq!(IntervalScheduler::new(50).period(), Duration::from_millis(20));
        assert_eq!(IntervalScheduler::new(0).period(), Duration::from_secs(1));
    }
}
