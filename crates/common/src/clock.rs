//! Time sources and timing utilities for stream synchronization.
//!
//! Both streams of a pair are driven from one monotonic time source.
//! This module provides:
//! - The [`TimeSource`] capability and its system/manual implementations
//! - Drift measurement between the two streams
//! - Frame-rate throttling independent of the scheduler's callback rate

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A monotonic clock reporting seconds since an arbitrary origin.
pub trait TimeSource: std::fmt::Debug {
    /// Current monotonic time in seconds. Never decreases.
    fn now_secs(&self) -> f64;
}

/// Wall-clock anchored monotonic time source backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    /// The instant the source was started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SystemTimeSource {
    /// Create a new time source anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Wall-clock time at the source's origin.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// A manually advanced time source. Clones share the same time.
///
/// Used by tests and by simulated playback, where the caller owns the
/// passage of time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Rc<Cell<f64>>,
}

impl ManualTimeSource {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_secs.max(0.0))),
        }
    }

    /// Move time forward by `secs`. Negative steps are ignored.
    pub fn advance(&self, secs: f64) {
        if secs > 0.0 {
            self.now.set(self.now.get() + secs);
        }
    }

    /// Jump to an absolute time. Going backwards is ignored.
    pub fn set(&self, secs: f64) {
        if secs > self.now.get() {
            self.now.set(secs);
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn now_secs(&self) -> f64 {
        self.now.get()
    }
}

/// Drift measurement between the two streams of a pair.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Position of the reference (color) stream in seconds.
    pub reference_secs: f64,
    /// Position of the measured (mask) stream in seconds.
    pub measured_secs: f64,
}

impl DriftMeasurement {
    /// Drift in seconds (positive = measured is ahead).
    pub fn drift_secs(&self) -> f64 {
        self.measured_secs - self.reference_secs
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_secs(&self, threshold_secs: f64) -> bool {
        self.drift_secs().abs() > threshold_secs
    }
}

/// Lowest accepted frame rate for the throttle.
pub const MIN_FRAME_RATE: u32 = 1;

/// Highest accepted frame rate for the throttle.
pub const MAX_FRAME_RATE: u32 = 120;

// Scheduler callbacks land a little early or late; without slack a 60Hz
// target on a 60Hz scheduler would drop every other frame.
const THROTTLE_SLACK_SECS: f64 = 0.001;

/// Rate limiter for frame work and throttled notifications.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval_secs: f64,
    last_tick_secs: Option<f64>,
}

impl FrameThrottle {
    /// Create a throttle targeting the given rate, clamped to 1..=120 Hz.
    pub fn new(target_hz: u32) -> Self {
        let hz = target_hz.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        Self::with_interval(1.0 / f64::from(hz))
    }

    /// Create a throttle with an explicit minimum interval.
    pub fn with_interval(interval_secs: f64) -> Self {
        Self {
            interval_secs: interval_secs.max(0.0),
            last_tick_secs: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now_secs: f64) -> bool {
        match self.last_tick_secs {
            None => {
                self.last_tick_secs = Some(now_secs);
                true
            }
            Some(last) if now_secs + THROTTLE_SLACK_SECS >= last + self.interval_secs => {
                self.last_tick_secs = Some(now_secs);
                true
            }
            _ => false,
        }
    }

    /// Forget the last tick so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_tick_secs = None;
    }

    /// Target interval in seconds.
    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }
}
