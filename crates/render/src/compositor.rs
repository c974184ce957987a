//! Compositor abstraction and backend selection.

use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_media::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::gpu::{GpuApi, GpuCompositor};
use crate::sizing::ResolvedSize;
use crate::software::SoftwareCompositor;
use crate::surface::PresentationSurface;

/// The two frames composited in one pass.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub color: VideoFrame<'a>,
    pub mask: VideoFrame<'a>,
}

/// What a render call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A new composited frame reached the surface.
    Drawn,
    /// Neither stream advanced since the last draw.
    Skipped,
    /// The GPU context is gone; nothing was drawn.
    ContextLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Gpu,
    Software,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Gpu => write!(f, "gpu"),
            BackendKind::Software => write!(f, "software"),
        }
    }
}

/// Produces one composited frame per call from a color/mask pair.
pub trait Compositor: std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Apply a new output size. Takes effect on the next render.
    fn resize(&mut self, size: &ResolvedSize);

    fn render(
        &mut self,
        frame: &FrameInput<'_>,
        surface: &mut dyn PresentationSurface,
    ) -> PlayerResult<RenderOutcome>;

    /// Free backend resources. Safe to call more than once.
    fn release(&mut self);
}

/// Which backend the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// GPU when available, silently falling back to software.
    #[default]
    Auto,
    /// GPU requested explicitly; falling back raises a warning.
    Gpu,
    /// Software only.
    Software,
}

impl BackendPreference {
    /// Map the `use_gpu_backend` configuration flag.
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => BackendPreference::Auto,
            Some(true) => BackendPreference::Gpu,
            Some(false) => BackendPreference::Software,
        }
    }
}

/// Result of [`select_backend`].
#[derive(Debug)]
pub struct BackendSelection {
    pub compositor: Box<dyn Compositor>,
    /// Set when an explicitly requested GPU backend was unavailable.
    pub warning: Option<PlayerError>,
}

/// Pick a compositor for the surface.
///
/// GPU API levels are tried newest first. Software is always available,
/// so selection itself never fails.
pub fn select_backend(
    preference: BackendPreference,
    surface: &mut dyn PresentationSurface,
) -> BackendSelection {
    if preference == BackendPreference::Software {
        tracing::debug!("Software compositor selected by configuration");
        return software_selection(None);
    }

    let mut last_error = String::from("no GPU context available");
    for api in GpuApi::PREFERENCE {
        let Some(context) = surface.create_gpu_context(api) else {
            tracing::debug!(%api, "GPU context unavailable");
            continue;
        };
        match GpuCompositor::new(context) {
            Ok(compositor) => {
                tracing::info!(%api, "Using GPU compositor");
                return BackendSelection {
                    compositor: Box::new(compositor),
                    warning: None,
                };
            }
            Err(e) => {
                tracing::debug!(%api, error = %e, "GPU compositor setup failed");
                last_error = e.to_string();
            }
        }
    }

    let warning = if preference == BackendPreference::Gpu {
        tracing::warn!(reason = %last_error, "GPU backend requested but unavailable, using software");
        Some(PlayerError::gpu_init(last_error))
    } else {
        tracing::info!("Using software compositor");
        None
    };
    software_selection(warning)
}

fn software_selection(warning: Option<PlayerError>) -> BackendSelection {
    BackendSelection {
        compositor: Box::new(SoftwareCompositor::new()),
        warning,
    }
}
