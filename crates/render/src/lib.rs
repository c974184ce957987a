//! AlphaPlay Render
//!
//! Composites one color frame and one mask frame into a single frame
//! with transparency, using either a GPU shader backend or a software
//! pixel-blend backend, and resolves the output surface's size.
//!
//! # Pipeline Architecture
//!
//! ```text
//! color frame ──┐
//!               ├── Compositor ─────────────┐
//! mask frame ───┘   ├── GpuCompositor       │
//!                   │   (texture upload,    │
//!                   │    rgb + mask.r)      ├── PresentationSurface
//!                   └── SoftwareCompositor  │
//!                       (scratch rasters,   │
//!                        luma → alpha)      │
//! SizingPolicy ─────────────────────────────┘
//! ```

pub mod compositor;
pub mod gpu;
pub mod headless;
pub mod sizing;
pub mod software;
pub mod surface;

pub use compositor::*;
pub use sizing::{ResolvedSize, SizeTracker, SizingInput};
pub use surface::*;
