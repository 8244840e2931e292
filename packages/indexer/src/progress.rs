//! Progress reporting trait for long-running operations.
//!
//! Defines a [`ProgressCallback`] trait that decouples progress reporting
//! from any specific rendering backend (e.g., `indicatif` progress bars or
//! silence). Rendering implementations live in the binaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default minimum interval between forwarded updates of a
/// [`ThrottledProgress`].
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(300);

/// Trait for reporting progress from long-running operations.
///
/// Implementations must be `Send + Sync` to support use across spawned
/// tokio tasks and `Arc`-based sharing.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Set the current position (absolute, not delta).
    fn set_position(&self, pos: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);

    /// Mark progress as complete and remove the progress indicator.
    fn finish_and_clear(&self);
}

/// A no-op implementation of [`ProgressCallback`] that silently ignores
/// all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Forwards position updates to another callback at most once per
/// interval. Increments are accumulated and forwarded together, so the
/// final position is never lost. Totals, messages and completion always go
/// straight through.
pub struct ThrottledProgress {
    inner: Arc<dyn ProgressCallback>,
    interval: Duration,
    last: Mutex<Option<Instant>>,
    /// Latest position not yet forwarded.
    position: Mutex<Option<u64>>,
    pending: AtomicU64,
}

impl ThrottledProgress {
    #[must_use]
    pub fn new(inner: Arc<dyn ProgressCallback>, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: Mutex::new(None),
            position: Mutex::new(None),
            pending: AtomicU64::new(0),
        }
    }

    /// Wraps a callback with [`DEFAULT_THROTTLE_INTERVAL`].
    #[must_use]
    pub fn wrap(inner: Arc<dyn ProgressCallback>) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(inner, DEFAULT_THROTTLE_INTERVAL))
    }

    fn due(&self) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn flush(&self) {
        let delta = self.pending.swap(0, Ordering::Relaxed);
        if delta > 0 {
            self.inner.inc(delta);
        }
        let position = self.position.lock().ok().and_then(|mut p| p.take());
        if let Some(position) = position {
            self.inner.set_position(position);
        }
    }
}

impl ProgressCallback for ThrottledProgress {
    fn set_total(&self, total: u64) {
        self.inner.set_total(total);
    }

    fn set_position(&self, pos: u64) {
        if let Ok(mut position) = self.position.lock() {
            *position = Some(pos);
        }
        if self.due() {
            self.flush();
        }
    }

    fn inc(&self, delta: u64) {
        self.pending.fetch_add(delta, Ordering::Relaxed);
        if self.due() {
            self.flush();
        }
    }

    fn set_message(&self, msg: String) {
        self.inner.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.flush();
        self.inner.finish(msg);
    }

    fn finish_and_clear(&self) {
        self.flush();
        self.inner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        positions: Mutex<Vec<u64>>,
        increments: AtomicU64,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, _total: u64) {}
        fn set_position(&self, pos: u64) {
            self.positions.lock().unwrap().push(pos);
        }
        fn inc(&self, delta: u64) {
            self.increments.fetch_add(delta, Ordering::Relaxed);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
        fn finish_and_clear(&self) {}
    }

    #[test]
    fn throttles_positions_but_keeps_the_last_one() {
        let recorder = Arc::new(Recorder::default());
        let throttled = ThrottledProgress::new(recorder.clone(), Duration::from_secs(3600));

        for pos in 1..=100 {
            throttled.set_position(pos);
        }
        assert_eq!(*recorder.positions.lock().unwrap(), vec![1]);

        throttled.finish("done".to_string());
        assert_eq!(*recorder.positions.lock().unwrap(), vec![1, 100]);
    }

    #[test]
    fn forwards_a_throttled_reset_to_zero() {
        let recorder = Arc::new(Recorder::default());
        let throttled = ThrottledProgress::new(recorder.clone(), Duration::from_secs(3600));

        throttled.set_position(50);
        throttled.set_position(0);
        throttled.finish("done".to_string());
        assert_eq!(*recorder.positions.lock().unwrap(), vec![50, 0]);

        // Nothing left to forward.
        throttled.finish_and_clear();
        assert_eq!(recorder.positions.lock().unwrap().len(), 2);
    }

    #[test]
    fn accumulates_increments() {
        let recorder = Arc::new(Recorder::default());
        let throttled = ThrottledProgress::new(recorder.clone(), Duration::from_secs(3600));

        for _ in 0..10 {
            throttled.inc(3);
        }
        throttled.finish_and_clear();
        assert_eq!(recorder.increments.load(Ordering::Relaxed), 30);
    }
}
