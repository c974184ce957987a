//! AlphaPlay Media
//!
//! Wraps the externally supplied decoding capability for the two streams
//! of a pair and drives them from "unloaded" to "ready to render".
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │               ReadinessPipeline                │
//! │   ┌──────────────────┐  ┌──────────────────┐   │
//! │   │ MediaSource      │  │ MediaSource      │   │
//! │   │ (color)          │  │ (mask)           │   │
//! │   └────────┬─────────┘  └────────┬─────────┘   │
//! │            │ timeout / grace     │             │
//! │            ▼                     ▼             │
//! │   ┌─────────────────────────────────────────┐  │
//! │   │ dimension + duration validation         │  │
//! │   └─────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────┘
//!              │
//!              ▼
//!        ReadyReport (effective duration, warnings)
//! ```

pub mod ranges;
pub mod readiness;
pub mod source;
pub mod synthetic;

pub use ranges::TimeRange;
pub use readiness::*;
pub use source::*;
