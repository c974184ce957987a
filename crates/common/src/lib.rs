//! AlphaPlay Common Utilities
//!
//! Shared infrastructure for all AlphaPlay crates:
//! - Error types and result aliases
//! - Time sources and frame-rate throttling for the shared playback clock
//! - Tracing/logging initialization
//! - Configuration loading
//! - Stream roles (color vs. mask)

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod role;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use role::*;

/// One frame at 60Hz. Sources further than this from the shared clock
/// are nudged back onto it.
pub const SYNC_THRESHOLD_SECS: f64 = 0.016;

/// Durations closer than this are considered equal.
pub const DURATION_EPSILON_SECS: f64 = 0.1;

/// Lower bound of the accepted playback rate.
pub const MIN_PLAYBACK_RATE: f64 = 0.25;

/// Upper bound of the accepted playback rate.
pub const MAX_PLAYBACK_RATE: f64 = 4.0;
