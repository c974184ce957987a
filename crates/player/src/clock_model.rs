//! The shared playback clock and repeat policy.
//!
//! Both streams follow one target position derived from a monotonic
//! timestamp: `target = (now - epoch) * rate`. The epoch is re-derived on
//! every rate change, seek and resync so the position stays continuous.

use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_common::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use serde::Serialize;

/// How many times playback traverses the full duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Loop forever.
    Infinite,
    /// Never play.
    None,
    /// Play once, then end.
    Once,
    /// Play `n > 1` times, then end.
    Count(u32),
}

impl RepeatPolicy {
    /// Map a repeat count: `-1` infinite, `0` none, `1` once, `n` finite.
    pub fn from_count(count: i32) -> PlayerResult<Self> {
        match count {
            -1 => Ok(RepeatPolicy::Infinite),
            0 => Ok(RepeatPolicy::None),
            1 => Ok(RepeatPolicy::Once),
            n if n > 1 => Ok(RepeatPolicy::Count(n as u32)),
            n => Err(PlayerError::invalid_input(format!(
                "repeat count must be -1 or greater, got {n}"
            ))),
        }
    }

    pub fn count(&self) -> i32 {
        match self {
            RepeatPolicy::Infinite => -1,
            RepeatPolicy::None => 0,
            RepeatPolicy::Once => 1,
            RepeatPolicy::Count(n) => i32::try_from(*n).unwrap_or(i32::MAX),
        }
    }

    pub fn is_infinite(&self) -> bool {
        *self == RepeatPolicy::Infinite
    }

    pub fn allows_playback(&self) -> bool {
        *self != RepeatPolicy::None
    }

    /// Total traversals before the terminal signal, `None` if unbounded.
    pub fn limit(&self) -> Option<u32> {
        match self {
            RepeatPolicy::Infinite => None,
            RepeatPolicy::None => Some(0),
            RepeatPolicy::Once => Some(1),
            RepeatPolicy::Count(n) => Some(*n),
        }
    }
}

/// Clamp a requested rate into the accepted range.
pub fn clamp_rate(rate: f64) -> f64 {
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Result of advancing the clock to `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub position: f64,
    /// At least one cycle boundary was crossed since the last advance.
    pub wrapped: bool,
    /// The repeat policy just reached its terminal condition.
    pub ended: bool,
}

#[derive(Debug, Clone)]
pub struct ClockModel {
    epoch: f64,
    rate: f64,
    duration: f64,
    repeat: RepeatPolicy,
    running: bool,
    /// Position while not running.
    held: f64,
    /// Iterations completed before the current epoch.
    base_iterations: u32,
    completed: u32,
    /// Iterations already completed when the current policy took effect.
    policy_origin: u32,
    terminal_reported: bool,
}

impl ClockModel {
    pub fn new(rate: f64, repeat: RepeatPolicy) -> Self {
        Self {
            epoch: 0.0,
            rate: clamp_rate(rate),
            duration: 0.0,
            repeat,
            running: false,
            held: 0.0,
            base_iterations: 0,
            completed: 0,
            policy_origin: 0,
            terminal_reported: false,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn repeat(&self) -> RepeatPolicy {
        self.repeat
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn completed_iterations(&self) -> u32 {
        self.completed
    }

    /// Set the effective duration. Positions are clamped into it.
    pub fn set_duration(&mut self, secs: f64) {
        self.duration = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        self.held = self.clamp_position(self.held);
    }

    /// Switch repeat policy. A new policy counts its traversals from the
    /// current position; iterations finished under the old one do not
    /// count toward the new limit.
    pub fn set_repeat(&mut self, repeat: RepeatPolicy, now: f64) {
        if repeat == self.repeat {
            return;
        }
        if self.running {
            let position = self.target_position(now);
            self.resync_epoch(position, now);
        }
        self.policy_origin = self.completed;
        self.repeat = repeat;
        self.terminal_reported = false;
    }

    /// Absolute iteration count at which the current policy ends.
    fn end_at(&self) -> Option<u32> {
        self.repeat
            .limit()
            .map(|limit| self.policy_origin.saturating_add(limit))
    }

    fn clamp_position(&self, position: f64) -> f64 {
        let floored = if position.is_finite() { position.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            floored.min(self.duration)
        } else {
            floored
        }
    }

    /// Unwrapped distance travelled since the epoch.
    fn raw(&self, now: f64) -> f64 {
        ((now - self.epoch) * self.rate).max(0.0)
    }

    fn cycle_index(&self, now: f64) -> u32 {
        if !self.running || self.duration <= 0.0 {
            return 0;
        }
        let cycles = (self.raw(now) / self.duration).floor();
        if cycles >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            cycles as u32
        }
    }

    fn iterations_at(&self, now: f64) -> u32 {
        self.base_iterations.saturating_add(self.cycle_index(now))
    }

    /// Position the streams should be at. Never negative.
    pub fn target_position(&self, now: f64) -> f64 {
        if !self.running {
            return self.held;
        }
        let raw = self.raw(now);
        if self.duration <= 0.0 {
            return raw;
        }
        match self.end_at() {
            Some(end) if self.repeat.allows_playback() && self.iterations_at(now) >= end => {
                self.duration
            }
            _ => raw % self.duration,
        }
    }

    /// Re-derive the epoch so `target_position(now) == position`.
    pub fn resync_epoch(&mut self, position: f64, now: f64) {
        let position = self.clamp_position(position);
        self.completed = self.completed.max(self.iterations_at(now));
        self.base_iterations = self.completed;
        self.held = position;
        self.epoch = now - position / self.rate;
    }

    /// Resync from a stream position on a looping timeline, where the
    /// stream and the clock may sit on opposite sides of the loop point.
    pub fn resync_looping(&mut self, position: f64, now: f64) {
        let duration = self.duration;
        if !self.running || !self.repeat.is_infinite() || duration <= 0.0 {
            self.resync_epoch(position, now);
            return;
        }
        let target = self.target_position(now);
        if position - target > duration / 2.0 {
            // The stream has not looped yet but the clock already counted
            // the boundary; stay in the current cycle.
            return;
        }
        let stream_looped_first = target - position > duration / 2.0;
        self.resync_epoch(position, now);
        if stream_looped_first {
            self.completed = self.completed.saturating_add(1);
            self.base_iterations = self.completed;
        }
    }

    /// Move to `position`, clamped into `[0, duration]`.
    pub fn seek_to(&mut self, position: f64, now: f64) {
        self.resync_epoch(position, now);
    }

    /// Change the rate without a position jump. Returns the clamped rate.
    pub fn set_rate(&mut self, rate: f64, now: f64) -> f64 {
        let position = self.target_position(now);
        self.rate = clamp_rate(rate);
        self.resync_epoch(position, now);
        self.rate
    }

    /// Start advancing from the held position.
    pub fn start(&mut self, now: f64) {
        if self.running {
            return;
        }
        let held = self.held;
        self.running = true;
        self.resync_epoch(held, now);
    }

    /// Freeze at the current position.
    pub fn stop(&mut self, now: f64) {
        if !self.running {
            return;
        }
        self.held = self.target_position(now);
        self.completed = self.completed.max(self.iterations_at(now));
        self.running = false;
    }

    /// Back to position 0 with no completed iterations.
    pub fn reset(&mut self) {
        self.running = false;
        self.held = 0.0;
        self.base_iterations = 0;
        self.completed = 0;
        self.policy_origin = 0;
        self.terminal_reported = false;
    }

    /// Advance to `now`, counting cycle boundaries and raising the
    /// terminal signal once.
    pub fn advance(&mut self, now: f64) -> ClockTick {
        if !self.running {
            return ClockTick {
                position: self.held,
                wrapped: false,
                ended: false,
            };
        }

        let before = self.completed;
        let iterations = self.iterations_at(now);
        let end = self.end_at();
        self.completed = match end {
            Some(end) => iterations.min(end),
            None => iterations,
        };
        let wrapped = self.completed > before;

        let ended = !self.terminal_reported && end.is_some_and(|end| self.completed >= end);
        if ended {
            self.terminal_reported = true;
            self.running = false;
            self.held = self.duration;
            return ClockTick {
                position: self.duration,
                wrapped,
                ended,
            };
        }

        ClockTick {
            position: self.target_position(now),
            wrapped,
            ended,
        }
    }
}

/// Distance between two positions; on a looping timeline the shorter way
/// around the cycle boundary counts.
pub fn position_distance(a: f64, b: f64, cycle: Option<f64>) -> f64 {
    let direct = (a - b).abs();
    match cycle {
        Some(duration) if duration > 0.0 => direct.min(duration - direct).max(0.0),
        _ => direct,
    }
}
