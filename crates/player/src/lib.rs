//! AlphaPlay Player
//!
//! Plays a color stream and a grayscale mask stream in lockstep and
//! composites them into one output with per-pixel transparency.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Player ──────────────────────────────────────────┐
//!             │ tick() from FrameLoop / host scheduler         │
//!             ▼                                                │
//!   ┌──────────────────┐   ┌──────────────┐   ┌────────────┐  │
//!   │ ReadinessPipeline│──►│ ClockModel   │──►│ Compositor │──► surface
//!   │ (color + mask)   │   │ sync / drift │   │ gpu | sw   │  │
//!   └──────────────────┘   └──────────────┘   └────────────┘  │
//!             │                                                │
//!             └──── LifecycleGuard (visibility, detach) ◄──────┘
//! ```
//!
//! Everything runs on one thread. Listeners are invoked synchronously from
//! the player's own methods.

pub mod clock_model;
pub mod events;
pub mod frame_loop;
pub mod lifecycle;
pub mod player;
pub mod surface_ref;

pub use clock_model::{ClockModel, ClockTick, RepeatPolicy};
pub use events::{EventBus, EventKind, ListenerId, PlayerEvent};
pub use frame_loop::{FrameLoop, TokioTimeSource};
pub use lifecycle::{LifecycleGuard, VisibilityObserver};
pub use player::*;
pub use surface_ref::{SurfaceLookup, SurfacePoll, SurfaceRef, SurfaceWaiter};
