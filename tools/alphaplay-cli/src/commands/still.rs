//! Composite one color/mask image pair into a transparent PNG.

use std::path::{Path, PathBuf};

use alphaplay_media::VideoFrame;
use alphaplay_render::software::SoftwareCompositor;
use alphaplay_render::FrameInput;
use image::RgbaImage;

fn load_rgba(path: &Path) -> anyhow::Result<RgbaImage> {
    let decoded = image::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    Ok(decoded.to_rgba8())
}

fn as_frame(image: &RgbaImage) -> VideoFrame<'_> {
    VideoFrame {
        width: image.width(),
        height: image.height(),
        position: 0.0,
        pixels: image.as_raw(),
    }
}

pub fn run(color: PathBuf, mask: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let color_image = load_rgba(&color)?;
    let mask_image = load_rgba(&mask)?;
    if color_image.dimensions() != mask_image.dimensions() {
        tracing::warn!(
            color = ?color_image.dimensions(),
            mask = ?mask_image.dimensions(),
            "Mask size differs from color; scaling mask"
        );
    }

    let mut compositor = SoftwareCompositor::new();
    let composited = compositor.composite(&FrameInput {
        color: as_frame(&color_image),
        mask: as_frame(&mask_image),
    })?;
    composited
        .save(&output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;

    println!(
        "Wrote {}x{} composite to {}",
        composited.width(),
        composited.height(),
        output.display()
    );
    Ok(())
}
