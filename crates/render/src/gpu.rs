//! GPU compositing backend.
//!
//! Draws one textured quad per frame: RGB from the color texture and
//! alpha from the mask texture's red channel, blended source-over onto a
//! cleared, fully transparent target.

use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_media::VideoFrame;

use crate::compositor::{BackendKind, Compositor, FrameInput, RenderOutcome};
use crate::sizing::ResolvedSize;
use crate::surface::PresentationSurface;

/// API level of a GPU context. Newer levels are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuApi {
    Gles3,
    Gles2,
}

impl GpuApi {
    /// Preference order when creating a context.
    pub const PREFERENCE: [GpuApi; 2] = [GpuApi::Gles3, GpuApi::Gles2];

    pub fn vertex_shader(self) -> &'static str {
        match self {
            GpuApi::Gles3 => VERTEX_SHADER_300,
            GpuApi::Gles2 => VERTEX_SHADER_100,
        }
    }

    pub fn fragment_shader(self) -> &'static str {
        match self {
            GpuApi::Gles3 => FRAGMENT_SHADER_300,
            GpuApi::Gles2 => FRAGMENT_SHADER_100,
        }
    }
}

impl std::fmt::Display for GpuApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuApi::Gles3 => write!(f, "gles3"),
            GpuApi::Gles2 => write!(f, "gles2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Blend equation for the draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// `src * src.a + dst * (1 - src.a)`
    SourceOver,
}

/// A single quad draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub quad: BufferId,
    pub color_texture: TextureId,
    pub mask_texture: TextureId,
    pub viewport: (u32, u32),
    pub blend: BlendMode,
    pub clear_rgba: [f32; 4],
}

/// The GPU primitives the compositor needs. Implemented per platform.
pub trait GpuContext {
    fn api(&self) -> GpuApi;

    /// Whether the context has been lost. Every call fails while lost.
    fn is_context_lost(&self) -> bool;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> PlayerResult<ShaderId>;

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> PlayerResult<ProgramId>;

    /// Create a buffer holding a full-target quad (two triangles, xy + uv).
    fn create_quad_buffer(&mut self, vertices: &[f32]) -> PlayerResult<BufferId>;

    /// Create a texture with linear filtering and clamp-to-edge wrap.
    fn create_texture(&mut self) -> PlayerResult<TextureId>;

    /// Upload RGBA8 pixels into a texture.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> PlayerResult<()>;

    fn draw(&mut self, call: &DrawCall) -> PlayerResult<()>;

    /// Delete every object created through this context.
    fn release(&mut self);
}

/// Full-target quad as a triangle strip: x, y, u, v.
pub const QUAD_VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, //
    1.0, 1.0, 1.0, 0.0,
];

pub const VERTEX_SHADER_300: &str = r#"#version 300 es
in vec2 a_position;
in vec2 a_texcoord;
out vec2 v_texcoord;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
    v_texcoord = a_texcoord;
}
"#;

pub const FRAGMENT_SHADER_300: &str = r#"#version 300 es
precision mediump float;
uniform sampler2D u_color;
uniform sampler2D u_mask;
in vec2 v_texcoord;
out vec4 out_color;
void main() {
    vec3 rgb = texture(u_color, v_texcoord).rgb;
    float alpha = texture(u_mask, v_texcoord).r;
    out_color = vec4(rgb, alpha);
}
"#;

pub const VERTEX_SHADER_100: &str = r#"attribute vec2 a_position;
attribute vec2 a_texcoord;
varying vec2 v_texcoord;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
    v_texcoord = a_texcoord;
}
"#;

pub const FRAGMENT_SHADER_100: &str = r#"precision mediump float;
uniform sampler2D u_color;
uniform sampler2D u_mask;
varying vec2 v_texcoord;
void main() {
    vec3 rgb = texture2D(u_color, v_texcoord).rgb;
    float alpha = texture2D(u_mask, v_texcoord).r;
    gl_FragColor = vec4(rgb, alpha);
}
"#;

/// Counters for texture uploads and draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStats {
    pub color_uploads: u64,
    pub mask_uploads: u64,
    pub draws: u64,
}

/// Shader-based compositor.
pub struct GpuCompositor {
    context: Box<dyn GpuContext>,
    program: ProgramId,
    quad: BufferId,
    color_texture: TextureId,
    mask_texture: TextureId,
    viewport: Option<(u32, u32)>,
    last_color_position: Option<f64>,
    last_mask_position: Option<f64>,
    drawn_once: bool,
    stats: GpuStats,
    released: bool,
}

impl std::fmt::Debug for GpuCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCompositor")
            .field("api", &self.context.api())
            .field("viewport", &self.viewport)
            .field("stats", &self.stats)
            .finish()
    }
}

impl GpuCompositor {
    /// Compile, link, and allocate everything needed to draw.
    ///
    /// Any failure releases the context and is reported as
    /// [`PlayerError::GpuInitFailed`].
    pub fn new(mut context: Box<dyn GpuContext>) -> PlayerResult<Self> {
        match Self::build_pipeline(context.as_mut()) {
            Ok((program, quad, color_texture, mask_texture)) => {
                tracing::debug!(api = %context.api(), "GPU pipeline ready");
                Ok(Self {
                    context,
                    program,
                    quad,
                    color_texture,
                    mask_texture,
                    viewport: None,
                    last_color_position: None,
                    last_mask_position: None,
                    drawn_once: false,
                    stats: GpuStats::default(),
                    released: false,
                })
            }
            Err(e) => {
                context.release();
                Err(PlayerError::gpu_init(format!(
                    "{} pipeline setup failed: {e}",
                    context.api()
                )))
            }
        }
    }

    fn build_pipeline(
        context: &mut dyn GpuContext,
    ) -> PlayerResult<(ProgramId, BufferId, TextureId, TextureId)> {
        let api = context.api();
        let vertex = context.compile_shader(ShaderStage::Vertex, api.vertex_shader())?;
        let fragment = context.compile_shader(ShaderStage::Fragment, api.fragment_shader())?;
        let program = context.link_program(vertex, fragment)?;
        let quad = context.create_quad_buffer(&QUAD_VERTICES)?;
        let color_texture = context.create_texture()?;
        let mask_texture = context.create_texture()?;
        Ok((program, quad, color_texture, mask_texture))
    }

    pub fn api(&self) -> GpuApi {
        self.context.api()
    }

    pub fn stats(&self) -> GpuStats {
        self.stats
    }

    fn upload(
        context: &mut dyn GpuContext,
        texture: TextureId,
        frame: &VideoFrame<'_>,
    ) -> PlayerResult<()> {
        context
            .upload_texture(texture, frame.width, frame.height, frame.pixels)
            .map_err(|e| PlayerError::render(format!("texture upload failed: {e}")))
    }
}

impl Compositor for GpuCompositor {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn resize(&mut self, size: &ResolvedSize) {
        self.viewport = Some((size.pixel_width, size.pixel_height));
    }

    fn render(
        &mut self,
        frame: &FrameInput<'_>,
        _surface: &mut dyn PresentationSurface,
    ) -> PlayerResult<RenderOutcome> {
        if self.released {
            return Err(PlayerError::render("compositor already released"));
        }
        if self.context.is_context_lost() {
            return Ok(RenderOutcome::ContextLost);
        }

        let color_changed = self.last_color_position != Some(frame.color.position);
        let mask_changed = self.last_mask_position != Some(frame.mask.position);

        if !color_changed && !mask_changed && self.drawn_once {
            return Ok(RenderOutcome::Skipped);
        }

        if color_changed {
            Self::upload(self.context.as_mut(), self.color_texture, &frame.color)?;
            self.last_color_position = Some(frame.color.position);
            self.stats.color_uploads += 1;
        }
        if mask_changed {
            Self::upload(self.context.as_mut(), self.mask_texture, &frame.mask)?;
            self.last_mask_position = Some(frame.mask.position);
            self.stats.mask_uploads += 1;
        }

        let call = DrawCall {
            program: self.program,
            quad: self.quad,
            color_texture: self.color_texture,
            mask_texture: self.mask_texture,
            viewport: self
                .viewport
                .unwrap_or((frame.color.width, frame.color.height)),
            blend: BlendMode::SourceOver,
            clear_rgba: [0.0, 0.0, 0.0, 0.0],
        };
        self.context
            .draw(&call)
            .map_err(|e| PlayerError::render(format!("draw failed: {e}")))?;

        self.drawn_once = true;
        self.stats.draws += 1;
        Ok(RenderOutcome::Drawn)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.context.release();
        }
    }
}

impl Drop for GpuCompositor {
    fn drop(&mut self) {
        self.release();
    }
}
