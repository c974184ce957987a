//! In-memory presentation surface and GPU context.
//!
//! Used by tests and the command-line simulator. Every object comes with a
//! cloneable handle that observes and steers it from outside the player.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use alphaplay_common::error::{PlayerError, PlayerResult};

use crate::gpu::{
    BufferId, DrawCall, GpuApi, GpuContext, ProgramId, ShaderId, ShaderStage, TextureId,
};
use crate::sizing::ResolvedSize;
use crate::surface::{ComputedStyle, GpuContextEvent, PresentationSurface};

#[derive(Debug, Default)]
struct RecorderState {
    lost: bool,
    fail_compile: bool,
    next_id: u32,
    uploads: u64,
    draws: u64,
    last_draw: Option<DrawCall>,
    release_count: u32,
}

/// Observes a [`RecordingGpuContext`].
#[derive(Debug, Clone, Default)]
pub struct GpuRecorder {
    state: Rc<RefCell<RecorderState>>,
}

impl GpuRecorder {
    pub fn set_lost(&self, lost: bool) {
        self.state.borrow_mut().lost = lost;
    }

    /// Make later shader compilations fail.
    pub fn fail_compile(&self, fail: bool) {
        self.state.borrow_mut().fail_compile = fail;
    }

    pub fn uploads(&self) -> u64 {
        self.state.borrow().uploads
    }

    pub fn draws(&self) -> u64 {
        self.state.borrow().draws
    }

    pub fn last_draw(&self) -> Option<DrawCall> {
        self.state.borrow().last_draw
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().release_count > 0
    }

    pub fn release_count(&self) -> u32 {
        self.state.borrow().release_count
    }
}

/// A GPU context that validates calls and counts them.
#[derive(Debug)]
pub struct RecordingGpuContext {
    api: GpuApi,
    recorder: GpuRecorder,
}

impl RecordingGpuContext {
    pub fn new(api: GpuApi) -> (Self, GpuRecorder) {
        let recorder = GpuRecorder::default();
        (
            Self {
                api,
                recorder: recorder.clone(),
            },
            recorder,
        )
    }

    fn next_id(&self) -> PlayerResult<u32> {
        let mut state = self.recorder.state.borrow_mut();
        if state.lost {
            return Err(PlayerError::render("context lost"));
        }
        state.next_id += 1;
        Ok(state.next_id)
    }
}

impl GpuContext for RecordingGpuContext {
    fn api(&self) -> GpuApi {
        self.api
    }

    fn is_context_lost(&self) -> bool {
        self.recorder.state.borrow().lost
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> PlayerResult<ShaderId> {
        if self.recorder.state.borrow().fail_compile || source.trim().is_empty() {
            return Err(PlayerError::gpu_init(format!("{stage:?} shader failed to compile")));
        }
        Ok(ShaderId(self.next_id()?))
    }

    fn link_program(&mut self, _vertex: ShaderId, _fragment: ShaderId) -> PlayerResult<ProgramId> {
        Ok(ProgramId(self.next_id()?))
    }

    fn create_quad_buffer(&mut self, vertices: &[f32]) -> PlayerResult<BufferId> {
        if vertices.len() % 4 != 0 {
            return Err(PlayerError::gpu_init("quad vertices must be x, y, u, v"));
        }
        Ok(BufferId(self.next_id()?))
    }

    fn create_texture(&mut self) -> PlayerResult<TextureId> {
        Ok(TextureId(self.next_id()?))
    }

    fn upload_texture(
        &mut self,
        _texture: TextureId,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> PlayerResult<()> {
        let mut state = self.recorder.state.borrow_mut();
        if state.lost {
            return Err(PlayerError::render("context lost"));
        }
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(PlayerError::render("texture data does not match dimensions"));
        }
        state.uploads += 1;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> PlayerResult<()> {
        let mut state = self.recorder.state.borrow_mut();
        if state.lost {
            return Err(PlayerError::render("context lost"));
        }
        state.draws += 1;
        state.last_draw = Some(*call);
        Ok(())
    }

    fn release(&mut self) {
        self.recorder.state.borrow_mut().release_count += 1;
    }
}

#[derive(Debug)]
struct SurfaceState {
    attached: bool,
    device_pixel_ratio: f64,
    container_constrained: bool,
    style: ComputedStyle,
    gpu_apis: Vec<GpuApi>,
    created_contexts: Vec<GpuApi>,
    current_recorder: Option<GpuRecorder>,
    events: VecDeque<GpuContextEvent>,
    applied_sizes: Vec<ResolvedSize>,
    presented: u64,
    last_presented_size: Option<(u32, u32)>,
    released: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            attached: true,
            device_pixel_ratio: 1.0,
            container_constrained: false,
            style: ComputedStyle::VISIBLE,
            gpu_apis: GpuApi::PREFERENCE.to_vec(),
            created_contexts: Vec::new(),
            current_recorder: None,
            events: VecDeque::new(),
            applied_sizes: Vec::new(),
            presented: 0,
            last_presented_size: None,
            released: false,
        }
    }
}

/// A surface that keeps everything in memory.
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Rc<RefCell<SurfaceState>>,
}

/// Controls and inspects a [`HeadlessSurface`].
#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    state: Rc<RefCell<SurfaceState>>,
}

impl HeadlessSurface {
    pub fn new() -> (Self, HeadlessHandle) {
        let state = Rc::new(RefCell::new(SurfaceState::default()));
        (
            Self {
                state: state.clone(),
            },
            HeadlessHandle { state },
        )
    }
}

impl HeadlessHandle {
    pub fn set_attached(&self, attached: bool) {
        self.state.borrow_mut().attached = attached;
    }

    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        self.state.borrow_mut().device_pixel_ratio = ratio;
    }

    pub fn set_container_constrained(&self, constrained: bool) {
        self.state.borrow_mut().container_constrained = constrained;
    }

    pub fn set_style(&self, style: ComputedStyle) {
        self.state.borrow_mut().style = style;
    }

    /// Restrict which GPU API levels can be created. Empty disables GPU.
    pub fn set_gpu_apis(&self, apis: &[GpuApi]) {
        self.state.borrow_mut().gpu_apis = apis.to_vec();
    }

    /// Lose the current GPU context and queue the notification.
    pub fn lose_context(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(recorder) = &state.current_recorder {
            recorder.set_lost(true);
        }
        state.events.push_back(GpuContextEvent::Lost);
    }

    /// Queue a restore notification. New contexts come up healthy.
    pub fn restore_context(&self) {
        self.state
            .borrow_mut()
            .events
            .push_back(GpuContextEvent::Restored);
    }

    pub fn created_contexts(&self) -> Vec<GpuApi> {
        self.state.borrow().created_contexts.clone()
    }

    /// Recorder of the most recently created GPU context.
    pub fn current_recorder(&self) -> Option<GpuRecorder> {
        self.state.borrow().current_recorder.clone()
    }

    pub fn applied_sizes(&self) -> Vec<ResolvedSize> {
        self.state.borrow().applied_sizes.clone()
    }

    pub fn presented_count(&self) -> u64 {
        self.state.borrow().presented
    }

    pub fn last_presented_size(&self) -> Option<(u32, u32)> {
        self.state.borrow().last_presented_size
    }

    /// Frames drawn, counting both GPU draws and software presents.
    pub fn frames_drawn(&self) -> u64 {
        let state = self.state.borrow();
        let gpu = state.current_recorder.as_ref().map_or(0, GpuRecorder::draws);
        state.presented + gpu
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }
}

impl PresentationSurface for HeadlessSurface {
    fn is_attached(&self) -> bool {
        self.state.borrow().attached
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.state.borrow().device_pixel_ratio
    }

    fn container_constrained(&self) -> bool {
        self.state.borrow().container_constrained
    }

    fn computed_style(&self) -> ComputedStyle {
        self.state.borrow().style
    }

    fn apply_size(&mut self, size: &ResolvedSize) {
        self.state.borrow_mut().applied_sizes.push(*size);
    }

    fn present_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) -> PlayerResult<()> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(PlayerError::render("presented frame does not match dimensions"));
        }
        let mut state = self.state.borrow_mut();
        state.presented += 1;
        state.last_presented_size = Some((width, height));
        Ok(())
    }

    fn create_gpu_context(&mut self, api: GpuApi) -> Option<Box<dyn GpuContext>> {
        let mut state = self.state.borrow_mut();
        if state.released || !state.gpu_apis.contains(&api) {
            return None;
        }
        let (context, recorder) = RecordingGpuContext::new(api);
        state.created_contexts.push(api);
        state.current_recorder = Some(recorder);
        Some(Box::new(context))
    }

    fn poll_gpu_event(&mut self) -> Option<GpuContextEvent> {
        self.state.borrow_mut().events.pop_front()
    }

    fn release(&mut self) {
        let mut state = self.state.borrow_mut();
        state.released = true;
        state.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lose_and_restore_queue_events() {
        let (mut surface, handle) = HeadlessSurface::new();
        let context = surface.create_gpu_context(GpuApi::Gles3).unwrap();
        handle.lose_context();
        assert!(context.is_context_lost());
        handle.restore_context();

        assert_eq!(surface.poll_gpu_event(), Some(GpuContextEvent::Lost));
        assert_eq!(surface.poll_gpu_event(), Some(GpuContextEvent::Restored));
        assert_eq!(surface.poll_gpu_event(), None);

        let fresh = surface.create_gpu_context(GpuApi::Gles3).unwrap();
        assert!(!fresh.is_context_lost());
    }

    #[test]
    fn test_lost_context_rejects_work() {
        let (mut context, recorder) = RecordingGpuContext::new(GpuApi::Gles2);
        recorder.set_lost(true);
        assert!(context.create_texture().is_err());
        assert!(context.upload_texture(TextureId(1), 1, 1, &[0; 4]).is_err());
    }

    #[test]
    fn test_present_validates_buffer() {
        let (mut surface, handle) = HeadlessSurface::new();
        assert!(surface.present_rgba(2, 2, &[0; 16]).is_ok());
        assert!(surface.present_rgba(2, 2, &[0; 4]).is_err());
        assert_eq!(handle.presented_count(), 1);
    }
}
