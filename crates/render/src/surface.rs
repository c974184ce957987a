//! The presentation surface capability.

use alphaplay_common::error::PlayerResult;

use crate::gpu::{GpuApi, GpuContext};
use crate::sizing::ResolvedSize;

/// Resolved display/visibility/opacity of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
}

impl ComputedStyle {
    pub const VISIBLE: ComputedStyle = ComputedStyle {
        display_none: false,
        visibility_hidden: false,
        opacity: 1.0,
    };

    pub fn is_visible(&self) -> bool {
        !self.display_none && !self.visibility_hidden && self.opacity > 0.0
    }
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self::VISIBLE
    }
}

/// GPU context notifications raised by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuContextEvent {
    Lost,
    Restored,
}

/// Where composited frames end up.
///
/// Owned by the player for its whole lifetime. Also the factory for GPU
/// contexts, since contexts are tied to the surface they draw into.
pub trait PresentationSurface {
    /// Whether the surface is still part of its presentation tree.
    fn is_attached(&self) -> bool;

    /// Physical pixels per logical pixel.
    fn device_pixel_ratio(&self) -> f64;

    /// Whether the surrounding layout already imposes a maximum size on
    /// the surface (which then must not be scaled by the pixel ratio).
    fn container_constrained(&self) -> bool;

    /// Current resolved style, for visibility polling.
    fn computed_style(&self) -> ComputedStyle;

    /// Apply output resolution and presentation size.
    fn apply_size(&mut self, size: &ResolvedSize);

    /// Present a composited RGBA8 frame (straight alpha).
    fn present_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) -> PlayerResult<()>;

    /// Create a GPU context of the given API level, if available.
    fn create_gpu_context(&mut self, api: GpuApi) -> Option<Box<dyn GpuContext>>;

    /// Next pending context notification.
    fn poll_gpu_event(&mut self) -> Option<GpuContextEvent>;

    /// Release surface-side resources.
    fn release(&mut self) {}
}
