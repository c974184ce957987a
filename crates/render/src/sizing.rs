//! Output surface sizing.
//!
//! Priority is fixed size, then auto-size (optionally fitted into a max
//! box), then nothing at all.

use alphaplay_common::config::Size;
use serde::Serialize;

/// Snapshot of everything sizing depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInput {
    pub fixed_size: Option<Size>,
    pub max_size: Option<Size>,
    pub auto_size: bool,
    /// Natural dimensions of the color source, once known.
    pub natural_size: Option<(u32, u32)>,
    pub device_pixel_ratio: f64,
    /// The container already constrains the surface's maximum size.
    pub container_constrained: bool,
}

/// Output resolution and presentation size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedSize {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub css_width: f64,
    pub css_height: f64,
    /// Device pixel scale applied to the presentation size.
    pub scale: f64,
}

impl ResolvedSize {
    fn from_css(css_width: f64, css_height: f64, scale: f64) -> Self {
        Self {
            pixel_width: to_pixels(css_width * scale),
            pixel_height: to_pixels(css_height * scale),
            css_width,
            css_height,
            scale,
        }
    }
}

fn to_pixels(value: f64) -> u32 {
    value.round().clamp(1.0, f64::from(u32::MAX)) as u32
}

fn sanitize_ratio(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

/// Scale `(width, height)` down to fit inside `max`, preserving aspect
/// ratio. Never scales up.
pub fn fit_within(width: f64, height: f64, max: Size) -> (f64, f64) {
    if !max.is_valid() || width <= 0.0 || height <= 0.0 {
        return (width, height);
    }
    let factor = (max.width / width).min(max.height / height).min(1.0);
    (width * factor, height * factor)
}

/// Resolve the output size. `None` means leave the surface alone.
pub fn resolve(input: &SizingInput) -> Option<ResolvedSize> {
    let dpr = sanitize_ratio(input.device_pixel_ratio);

    if let Some(fixed) = input.fixed_size.filter(Size::is_valid) {
        return Some(ResolvedSize::from_css(fixed.width, fixed.height, dpr));
    }

    if !input.auto_size {
        return None;
    }
    let (width, height) = input.natural_size.filter(|(w, h)| *w > 0 && *h > 0)?;
    let (mut css_width, mut css_height) = (f64::from(width), f64::from(height));
    if let Some(max) = input.max_size {
        (css_width, css_height) = fit_within(css_width, css_height, max);
    }
    let scale = if input.container_constrained { 1.0 } else { dpr };
    Some(ResolvedSize::from_css(css_width, css_height, scale))
}

/// Remembers the last resolution and reports only real changes.
#[derive(Debug, Clone, Default)]
pub struct SizeTracker {
    last: Option<ResolvedSize>,
}

impl SizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new resolution. Returns it if it differs from the last.
    pub fn update(&mut self, resolved: Option<ResolvedSize>) -> Option<ResolvedSize> {
        let resolved = resolved?;
        if self.last == Some(resolved) {
            return None;
        }
        self.last = Some(resolved);
        Some(resolved)
    }

    pub fn current(&self) -> Option<ResolvedSize> {
        self.last
    }
}
