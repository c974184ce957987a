//! Scheduler glue: drives [`Player::tick`] from a tokio interval.
//!
//! The player is single-threaded (`Rc`, boxed trait objects without
//! `Send`), so the loop runs on a [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use alphaplay_common::clock::{TimeSource, MAX_FRAME_RATE, MIN_FRAME_RATE};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::player::{Player, PlayerState};

/// Time source backed by tokio's clock, so paused-time tests and the
/// frame loop agree on "now".
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeSource {
    origin: Instant,
}

impl TokioTimeSource {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for TokioTimeSource {
    fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Calls `tick` at the scheduler's native rate. The player's own frame
/// throttle decides which of those callbacks do frame work.
#[derive(Debug, Clone, Copy)]
pub struct FrameLoop {
    period: Duration,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FrameLoop {
    pub fn new(native_hz: u32) -> Self {
        let hz = native_hz.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(hz)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick until the player is destroyed or `limit` elapses. Returns the
    /// number of ticks delivered.
    ///
    /// A tick is skipped when the player is already borrowed elsewhere.
    pub async fn run(&self, player: Rc<RefCell<Player>>, limit: Option<Duration>) -> u64 {
        let started = Instant::now();
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        loop {
            interval.tick().await;
            if limit.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
            let Ok(mut player) = player.try_borrow_mut() else {
                tracing::trace!("Player busy; skipping tick");
                continue;
            };
            if player.state() == PlayerState::Destroyed {
                break;
            }
            player.tick();
            ticks += 1;
        }

        tracing::debug!(ticks, "Frame loop stopped");
        ticks
    }

    /// Run on the current [`tokio::task::LocalSet`] until the player is
    /// destroyed.
    pub fn spawn(self, player: Rc<RefCell<Player>>) -> JoinHandle<u64> {
        tokio::task::spawn_local(async move { self.run(player, None).await })
    }
}
