//! Software compositing backend.
//!
//! Both frames are drawn into scratch rasters sized to the color frame's
//! natural dimensions, then each output alpha is taken from the mask's
//! luminance.

use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_media::VideoFrame;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::compositor::{BackendKind, Compositor, FrameInput, RenderOutcome};
use crate::sizing::ResolvedSize;
use crate::surface::PresentationSurface;

/// Rec. 601 luma of an RGB triple.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

/// Replace the alpha of every `color` pixel with the luminance of the
/// matching `mask` pixel. Both buffers are RGBA8 of equal length.
pub fn apply_luma_alpha(color: &mut [u8], mask: &[u8]) -> PlayerResult<()> {
    if color.len() != mask.len() || color.len() % 4 != 0 {
        return Err(PlayerError::render(format!(
            "raster size mismatch: color {} bytes, mask {} bytes",
            color.len(),
            mask.len()
        )));
    }
    for (dst, m) in color.chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
        dst[3] = luminance(m[0], m[1], m[2]);
    }
    Ok(())
}

/// Pixel-blend compositor. Never fails to initialize.
#[derive(Debug)]
pub struct SoftwareCompositor {
    color: RgbaImage,
    mask: RgbaImage,
    allocations: u64,
    frames: u64,
    released: bool,
}

impl Default for SoftwareCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareCompositor {
    pub fn new() -> Self {
        Self {
            color: RgbaImage::new(0, 0),
            mask: RgbaImage::new(0, 0),
            allocations: 0,
            frames: 0,
            released: false,
        }
    }

    /// How many times the scratch rasters were (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Composite a pair without presenting it. Used for still extraction.
    pub fn composite(&mut self, frame: &FrameInput<'_>) -> PlayerResult<&RgbaImage> {
        let (width, height) = (frame.color.width, frame.color.height);
        if width == 0 || height == 0 {
            return Err(PlayerError::render("color frame has zero size"));
        }
        if self.color.dimensions() != (width, height) {
            self.color = RgbaImage::new(width, height);
            self.mask = RgbaImage::new(width, height);
            self.allocations += 1;
            tracing::debug!(width, height, "Allocated software scratch rasters");
        }

        draw_into(&mut self.color, &frame.color)?;
        draw_into(&mut self.mask, &frame.mask)?;
        apply_luma_alpha(&mut self.color, &self.mask)?;
        self.frames += 1;
        Ok(&self.color)
    }
}

fn draw_into(scratch: &mut RgbaImage, frame: &VideoFrame<'_>) -> PlayerResult<()> {
    if !frame.is_well_formed() {
        return Err(PlayerError::render(format!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.pixels.len(),
            frame.width,
            frame.height
        )));
    }
    if (frame.width, frame.height) == scratch.dimensions() {
        scratch.copy_from_slice(frame.pixels);
        return Ok(());
    }

    let view = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(frame.width, frame.height, frame.pixels)
        .ok_or_else(|| PlayerError::render("frame buffer too small"))?;
    let scaled = imageops::resize(
        &view,
        scratch.width(),
        scratch.height(),
        FilterType::Triangle,
    );
    scratch.copy_from_slice(&scaled);
    Ok(())
}

impl Compositor for SoftwareCompositor {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    // Output resolution follows the color frame; the surface scales.
    fn resize(&mut self, _size: &ResolvedSize) {}

    fn render(
        &mut self,
        frame: &FrameInput<'_>,
        surface: &mut dyn PresentationSurface,
    ) -> PlayerResult<RenderOutcome> {
        if self.released {
            return Err(PlayerError::render("compositor already released"));
        }
        let output = self.composite(frame)?;
        surface.present_rgba(output.width(), output.height(), output)?;
        Ok(RenderOutcome::Drawn)
    }

    fn release(&mut self) {
        self.released = true;
        self.color = RgbaImage::new(0, 0);
        self.mask = RgbaImage::new(0, 0);
    }
}
