//! The player aggregate and its playback state machine.
//!
//! A [`Player`] owns both media sources, the shared clock, the active
//! compositor, the output surface and the lifecycle guard. All work
//! happens in [`Player::tick`], which the caller (or [`crate::FrameLoop`])
//! invokes from its scheduler; nothing blocks and nothing runs in
//! parallel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use alphaplay_common::clock::{DriftMeasurement, FrameThrottle, TimeSource};
use alphaplay_common::config::{PlayerConfig, Size};
use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_common::role::StreamRole;
use alphaplay_common::SYNC_THRESHOLD_SECS;
use alphaplay_media::ranges::intersect;
use alphaplay_media::{
    ErrorTriage, MediaBackend, MediaSignal, MediaSource, ReadinessOutcome, ReadinessPipeline,
    ReadinessPolicy, ReadyReport, TimeRange, TriageVerdict, ERROR_GRACE_SECS,
};
use alphaplay_render::software::SoftwareCompositor;
use alphaplay_render::{
    select_backend, sizing, BackendKind, BackendPreference, Compositor, FrameInput,
    GpuContextEvent, PresentationSurface, RenderOutcome, SizeTracker, SizingInput,
};
use serde::Serialize;
use tokio::sync::watch;

use crate::clock_model::{position_distance, ClockModel, RepeatPolicy};
use crate::events::{EventBus, EventKind, ListenerId, PlayerEvent};
use crate::lifecycle::{LifecycleGuard, VisibilityObserver};
use crate::surface_ref::{SurfaceLookup, SurfacePoll, SurfaceRef, SurfaceWaiter};

/// A seek that has not converged by then is force-cleared.
pub const SEEK_TIMEOUT_SECS: f64 = 1.0;

/// Minimum spacing of `timeupdate` notifications.
pub const TIME_UPDATE_INTERVAL_SECS: f64 = 0.016;

/// Lifecycle states of a [`Player`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Ended,
    Destroyed,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Uninitialized => "uninitialized",
            PlayerState::Initializing => "initializing",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Ended => "ended",
            PlayerState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Outcome of an initialization attempt.
#[derive(Debug, Clone)]
pub enum InitStatus {
    Pending,
    Ready,
    Failed(Arc<PlayerError>),
    /// The player was destroyed first.
    Cancelled,
}

impl InitStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, InitStatus::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, InitStatus::Ready)
    }
}

/// Shared view of one initialization attempt. Every caller of
/// [`Player::initialize`] during the same attempt observes the same outcome.
#[derive(Debug, Clone)]
pub struct InitTicket {
    rx: watch::Receiver<InitStatus>,
}

impl InitTicket {
    fn settled(status: InitStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        Self { rx }
    }

    pub fn status(&self) -> InitStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the attempt settles.
    pub async fn wait(&mut self) -> InitStatus {
        let current = self.status();
        if !current.is_pending() {
            return current;
        }
        let settled = self
            .rx
            .wait_for(|status| !status.is_pending())
            .await
            .map(|status| (*status).clone());
        match settled {
            Ok(status) => status,
            Err(_) => match self.status() {
                InitStatus::Pending => InitStatus::Cancelled,
                status => status,
            },
        }
    }
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub hidden_ticks: u64,
    pub sync_corrections: u64,
    pub drift_corrections: u64,
    pub seeks: u64,
    pub completed_iterations: u32,
    pub backend: Option<BackendKind>,
}

/// Construction inputs that are not plain configuration.
pub struct PlayerOptions {
    pub color_source: String,
    pub mask_source: String,
    pub surface: SurfaceRef,
    pub config: PlayerConfig,
    pub on_ready: Option<Box<dyn FnMut()>>,
    pub on_error: Option<Box<dyn FnMut(&PlayerError)>>,
}

impl std::fmt::Debug for PlayerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerOptions")
            .field("color_source", &self.color_source)
            .field("mask_source", &self.mask_source)
            .field("surface", &self.surface)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlayerOptions {
    pub fn new(
        color_source: impl Into<String>,
        mask_source: impl Into<String>,
        surface: SurfaceRef,
    ) -> Self {
        Self {
            color_source: color_source.into(),
            mask_source: mask_source.into(),
            surface,
            config: PlayerConfig::default(),
            on_ready: None,
            on_error: None,
        }
    }

    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_ready(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(&PlayerError) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// Platform capabilities the player runs against.
pub struct PlayerEnvironment {
    pub time: Rc<dyn TimeSource>,
    pub media: Box<dyn MediaBackend>,
    pub surface_lookup: Option<Box<dyn SurfaceLookup>>,
    pub visibility: Option<Box<dyn VisibilityObserver>>,
}

impl PlayerEnvironment {
    pub fn new(time: Rc<dyn TimeSource>, media: impl MediaBackend + 'static) -> Self {
        Self {
            time,
            media: Box::new(media),
            surface_lookup: None,
            visibility: None,
        }
    }

    pub fn with_surface_lookup(mut self, lookup: impl SurfaceLookup + 'static) -> Self {
        self.surface_lookup = Some(Box::new(lookup));
        self
    }

    pub fn with_visibility_observer(mut self, observer: impl VisibilityObserver + 'static) -> Self {
        self.visibility = Some(Box::new(observer));
        self
    }
}

#[derive(Debug)]
struct SourcePair {
    color: MediaSource,
    mask: MediaSource,
}

impl SourcePair {
    fn any_seeking(&self) -> bool {
        self.color.is_seeking() || self.mask.is_seeking()
    }
}

#[derive(Debug, Clone, Copy)]
struct SeekState {
    target: f64,
    started: f64,
}

/// Plays a color stream and a mask stream in lockstep and composites
/// them into one transparent output.
pub struct Player {
    config: PlayerConfig,
    color_locator: String,
    mask_locator: String,

    time: Rc<dyn TimeSource>,
    media: Box<dyn MediaBackend>,
    surface_lookup: Option<Box<dyn SurfaceLookup>>,
    surface_waiter: Option<SurfaceWaiter>,
    surface: Option<Box<dyn PresentationSurface>>,

    compositor: Option<Box<dyn Compositor>>,
    backend_preference: BackendPreference,
    gpu_lost: bool,
    render_fallback_reported: bool,

    sources: Option<SourcePair>,
    pipeline: Option<ReadinessPipeline>,
    runtime_triage: [ErrorTriage; 2],

    state: PlayerState,
    clock: ClockModel,
    init_tx: Option<watch::Sender<InitStatus>>,
    play_intent: bool,
    pending_start: Option<f64>,
    seek: Option<SeekState>,
    repaint_pending: bool,
    volume: f64,
    effective_duration: Option<f64>,
    natural_size: Option<(u32, u32)>,

    size_tracker: SizeTracker,
    lifecycle: LifecycleGuard,
    frame_throttle: FrameThrottle,
    time_update_throttle: FrameThrottle,

    events: EventBus,
    on_ready: Option<Box<dyn FnMut()>>,
    on_error: Option<Box<dyn FnMut(&PlayerError)>>,
    stats: PlayerStats,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("color", &self.color_locator)
            .field("mask", &self.mask_locator)
            .field("clock", &self.clock)
            .field("backend", &self.compositor.as_ref().map(|c| c.kind()))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn as_lookup(lookup: &mut Option<Box<dyn SurfaceLookup>>) -> Option<&mut dyn SurfaceLookup> {
    match lookup {
        Some(lookup) => Some(lookup.as_mut()),
        None => None,
    }
}

impl Player {
    /// Validate the options and start initialization.
    ///
    /// Fails synchronously with `InvalidInput` for malformed options or an
    /// unresolvable surface (unless `wait_for_surface` is set). Load
    /// failures arrive later through the `error` event.
    pub fn new(options: PlayerOptions, env: PlayerEnvironment) -> PlayerResult<Self> {
        let PlayerOptions {
            color_source,
            mask_source,
            surface,
            config,
            on_ready,
            on_error,
        } = options;

        config.validate()?;
        let color_locator = color_source.trim().to_string();
        let mask_locator = mask_source.trim().to_string();
        if color_locator.is_empty() {
            return Err(PlayerError::invalid_input("color source locator is empty"));
        }
        if mask_locator.is_empty() {
            return Err(PlayerError::invalid_input("mask source locator is empty"));
        }
        let repeat = RepeatPolicy::from_count(config.repeat_count)?;

        let PlayerEnvironment {
            time,
            media,
            mut surface_lookup,
            visibility,
        } = env;

        let now = time.now_secs();
        let mut waiter = SurfaceWaiter::new(
            surface,
            config.wait_for_surface,
            config.surface_timeout_secs,
            now,
        );
        let (surface, surface_waiter) = match waiter.poll(as_lookup(&mut surface_lookup), now) {
            SurfacePoll::Resolved(surface) => (Some(surface), None),
            SurfacePoll::Pending => {
                tracing::debug!(
                    timeout_secs = config.surface_timeout_secs,
                    "Waiting for output surface"
                );
                (None, Some(waiter))
            }
            SurfacePoll::Failed(err) => return Err(err),
        };

        let mut player = Self {
            color_locator,
            mask_locator,
            time,
            media,
            surface_lookup,
            surface_waiter,
            surface,
            compositor: None,
            backend_preference: BackendPreference::from_flag(config.use_gpu_backend),
            gpu_lost: false,
            render_fallback_reported: false,
            sources: None,
            pipeline: None,
            runtime_triage: [
                ErrorTriage::new(ERROR_GRACE_SECS),
                ErrorTriage::new(ERROR_GRACE_SECS),
            ],
            state: PlayerState::Uninitialized,
            clock: ClockModel::new(config.initial_rate, repeat),
            init_tx: None,
            play_intent: false,
            pending_start: None,
            seek: None,
            repaint_pending: false,
            volume: config.initial_volume,
            effective_duration: None,
            natural_size: None,
            size_tracker: SizeTracker::new(),
            lifecycle: LifecycleGuard::new(visibility, config.pause_when_hidden),
            frame_throttle: FrameThrottle::new(config.target_frame_rate),
            time_update_throttle: FrameThrottle::with_interval(TIME_UPDATE_INTERVAL_SECS),
            events: EventBus::new(),
            on_ready,
            on_error,
            stats: PlayerStats::default(),
            config,
        };
        player.initialize();
        Ok(player)
    }

    /// Start loading, or join the load already in flight.
    ///
    /// Calls made while a load is in flight share its ticket instead of
    /// opening the sources again. After a failed attempt a new call
    /// starts over.
    pub fn initialize(&mut self) -> InitTicket {
        match self.state {
            PlayerState::Destroyed => return InitTicket::settled(InitStatus::Cancelled),
            PlayerState::Uninitialized => {}
            _ => {
                return match &self.init_tx {
                    Some(tx) => InitTicket { rx: tx.subscribe() },
                    None => InitTicket::settled(InitStatus::Ready),
                };
            }
        }

        let (tx, rx) = watch::channel(InitStatus::Pending);
        self.init_tx = Some(tx);
        self.state = PlayerState::Initializing;
        tracing::info!(
            color = %self.color_locator,
            mask = %self.mask_locator,
            backend = self.media.name(),
            "Initializing player"
        );

        let now = self.time.now_secs();
        let mut pair = match self.open_sources() {
            Ok(pair) => pair,
            Err(err) => {
                self.fail_initialization(err);
                return InitTicket { rx };
            }
        };

        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy {
            load_timeout_secs: self.config.load_timeout_secs,
            error_grace_secs: ERROR_GRACE_SECS,
            strict_duration: self.config.strict_duration,
        });
        let begun = pipeline.begin(&mut pair.color, &mut pair.mask, now);
        self.sources = Some(pair);
        match begun {
            Ok(()) => self.pipeline = Some(pipeline),
            Err(err) => self.fail_initialization(err),
        }
        InitTicket { rx }
    }

    fn open_sources(&mut self) -> PlayerResult<SourcePair> {
        let color = MediaSource::open(self.media.as_mut(), StreamRole::Color, &self.color_locator)?;
        let mask = MediaSource::open(self.media.as_mut(), StreamRole::Mask, &self.mask_locator)?;
        Ok(SourcePair { color, mask })
    }

    fn select_compositor(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let selection = select_backend(self.backend_preference, surface.as_mut());
        let mut compositor = selection.compositor;
        if let Some(size) = self.size_tracker.current() {
            compositor.resize(&size);
        }
        self.compositor = Some(compositor);
        if let Some(warning) = selection.warning {
            self.emit_warning(warning);
        }
    }

    /// One scheduler callback's worth of work.
    pub fn tick(&mut self) {
        if self.state == PlayerState::Destroyed {
            return;
        }
        let now = self.time.now_secs();
        self.process_gpu_events();

        match self.state {
            PlayerState::Uninitialized | PlayerState::Destroyed => return,
            PlayerState::Initializing => {
                self.poll_initialization(now);
                return;
            }
            _ => {}
        }

        self.poll_runtime_signals(now);
        self.check_seek(now);

        if self.state == PlayerState::Playing && self.surface_detached() {
            tracing::warn!("Output surface detached; pausing");
            self.pause();
            self.emit_warning(PlayerError::SurfaceDetached);
            return;
        }
        if !self.surface_visible(now) {
            self.stats.hidden_ticks += 1;
            return;
        }
        if !self.frame_throttle.should_tick(now) {
            return;
        }

        self.refresh_size();
        if self.state == PlayerState::Playing {
            self.playback_step(now);
        } else if self.repaint_pending && self.seek.is_none() {
            self.render_frame();
        }
    }

    fn poll_initialization(&mut self, now: f64) {
        if self.surface.is_none() {
            let Some(waiter) = self.surface_waiter.as_mut() else {
                return;
            };
            match waiter.poll(as_lookup(&mut self.surface_lookup), now) {
                SurfacePoll::Resolved(surface) => {
                    self.surface = Some(surface);
                    self.surface_waiter = None;
                }
                SurfacePoll::Pending => return,
                SurfacePoll::Failed(err) => {
                    self.surface_waiter = None;
                    self.fail_initialization(err);
                    return;
                }
            }
        }

        if self.compositor.is_none() && !self.gpu_lost {
            self.select_compositor();
        }

        let (Some(pipeline), Some(sources)) = (self.pipeline.as_mut(), self.sources.as_mut()) else {
            return;
        };
        match pipeline.poll(&mut sources.color, &mut sources.mask, now) {
            None => {}
            Some(ReadinessOutcome::Ready(report)) => self.complete_initialization(report, now),
            Some(ReadinessOutcome::Failed(err)) => self.fail_initialization(err),
        }
    }

    fn complete_initialization(&mut self, report: ReadyReport, now: f64) {
        self.pipeline = None;
        let ReadyReport {
            effective_duration,
            color_size,
            warnings,
            ..
        } = report;
        tracing::info!(
            duration = effective_duration,
            width = color_size.0,
            height = color_size.1,
            "Both sources ready"
        );

        self.effective_duration = Some(effective_duration);
        self.natural_size = Some(color_size);
        self.clock.set_duration(effective_duration);
        let start = self.pending_start.take().unwrap_or(0.0);
        self.clock.seek_to(start, now);
        let start = self.clock.target_position(now);

        let repeat = self.clock.repeat();
        let rate = self.clock.rate();
        if let Some(sources) = self.sources.as_mut() {
            for source in [&mut sources.color, &mut sources.mask] {
                source.set_rate(rate);
                source.set_native_loop(repeat.is_infinite());
            }
            sources.color.set_volume(self.volume);
            sources.mask.set_volume(0.0);
            if start > 0.0 {
                sources.color.seek(start);
                sources.mask.seek(start);
                self.seek = Some(SeekState {
                    target: start,
                    started: now,
                });
            }
        }

        for warning in warnings {
            self.emit_warning(warning);
        }

        self.state = PlayerState::Ready;
        self.refresh_size();
        self.repaint_pending = true;
        if self.seek.is_none() {
            self.render_frame();
        }

        if let Some(tx) = &self.init_tx {
            tx.send_replace(InitStatus::Ready);
        }
        self.events.emit(&PlayerEvent::Ready);
        if let Some(callback) = self.on_ready.as_mut() {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::error!("on_ready callback panicked");
            }
        }

        if self.config.autoplay || self.play_intent {
            self.play_intent = false;
            self.play();
        }
    }

    fn fail_initialization(&mut self, err: PlayerError) {
        tracing::error!(error = %err, "Initialization failed");
        self.pipeline = None;
        self.release_sources();
        self.state = PlayerState::Uninitialized;
        let err = Arc::new(err);
        if let Some(tx) = &self.init_tx {
            tx.send_replace(InitStatus::Failed(err.clone()));
        }
        self.report_error(err);
    }

    fn report_error(&mut self, err: Arc<PlayerError>) {
        self.events.emit(&PlayerEvent::Error(err.clone()));
        if let Some(callback) = self.on_error.as_mut() {
            if catch_unwind(AssertUnwindSafe(|| callback(err.as_ref()))).is_err() {
                tracing::error!("on_error callback panicked");
            }
        }
    }

    fn emit_warning(&mut self, warning: PlayerError) {
        tracing::warn!(warning = %warning, "Player warning");
        self.events.emit(&PlayerEvent::Warning(Arc::new(warning)));
    }

    fn process_gpu_events(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let mut pending = Vec::new();
        while let Some(event) = surface.poll_gpu_event() {
            pending.push(event);
        }

        for event in pending {
            match event {
                GpuContextEvent::Lost => {
                    let on_gpu = self
                        .compositor
                        .as_ref()
                        .is_some_and(|c| c.kind() == BackendKind::Gpu);
                    if on_gpu {
                        self.drop_gpu_backend();
                    }
                }
                GpuContextEvent::Restored => {
                    if self.gpu_lost || self.compositor.is_none() {
                        tracing::info!("GPU context restored; reselecting backend");
                        self.gpu_lost = false;
                        self.select_compositor();
                        self.repaint_pending = true;
                    }
                }
            }
        }
    }

    fn drop_gpu_backend(&mut self) {
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
        }
        if !self.gpu_lost {
            tracing::warn!("GPU context lost; skipping frames until restored");
        }
        self.gpu_lost = true;
    }

    fn fall_back_to_software(&mut self, err: PlayerError) {
        tracing::warn!(error = %err, "Render backend failed; switching to software");
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
        }
        let mut software: Box<dyn Compositor> = Box::new(SoftwareCompositor::new());
        if let Some(size) = self.size_tracker.current() {
            software.resize(&size);
        }
        self.compositor = Some(software);
        self.stats.frames_skipped += 1;
        if !self.render_fallback_reported {
            self.render_fallback_reported = true;
            self.emit_warning(err);
        }
    }

    fn poll_runtime_signals(&mut self, now: f64) {
        let Some(sources) = self.sources.as_mut() else {
            return;
        };
        let mut verdicts = Vec::new();
        let pairs = [&mut sources.color, &mut sources.mask]
            .into_iter()
            .zip(self.runtime_triage.iter_mut());
        for (source, triage) in pairs {
            for signal in source.poll_signals() {
                match signal {
                    MediaSignal::Error => triage.note_signal(now),
                    MediaSignal::Seeked(position) => {
                        tracing::trace!(stream = %source.role(), position, "Seek landed");
                    }
                    MediaSignal::Stalled => {
                        tracing::debug!(stream = %source.role(), "Source stalled");
                    }
                }
            }
            if let Some(verdict) = triage.check(source, now) {
                verdicts.push(verdict);
            }
        }

        for verdict in verdicts {
            match verdict {
                TriageVerdict::Recovered(warning) => self.emit_warning(warning),
                TriageVerdict::Ignored => {}
                TriageVerdict::Fatal(err) => {
                    tracing::error!(error = %err, "Source failed during playback");
                    self.pause();
                    self.report_error(Arc::new(err));
                }
            }
        }
    }

    fn check_seek(&mut self, now: f64) {
        let Some(seek) = self.seek else {
            return;
        };
        let converged = self.sources.as_ref().map_or(true, |s| {
            [&s.color, &s.mask]
                .iter()
                .all(|source| !source.is_seeking() && source.has_sufficient_data())
        });
        if !converged {
            if now - seek.started < SEEK_TIMEOUT_SECS {
                return;
            }
            tracing::warn!(target = seek.target, "Seek did not converge in time; clearing");
        }

        self.seek = None;
        if self.state == PlayerState::Playing {
            if let Some(sources) = self.sources.as_ref() {
                self.clock.resync_looping(sources.color.position(), now);
            }
        }
        self.repaint_pending = true;
        tracing::debug!(position = seek.target, "Seek complete");
        self.events.emit(&PlayerEvent::Seeked {
            position: seek.target,
        });
    }

    fn surface_detached(&mut self) -> bool {
        match self.surface.as_deref() {
            Some(surface) => self.lifecycle.check_detached(surface),
            None => false,
        }
    }

    fn surface_visible(&mut self, now: f64) -> bool {
        match self.surface.as_deref() {
            Some(surface) => self.lifecycle.update_visibility(surface, now),
            None => true,
        }
    }

    fn playback_step(&mut self, now: f64) {
        let tick = self.clock.advance(now);
        if tick.ended {
            self.finish_playback(tick.position);
            return;
        }

        let repeat = self.clock.repeat();
        if tick.wrapped {
            tracing::debug!(
                iteration = self.clock.completed_iterations(),
                "Playback cycle completed"
            );
            if !repeat.is_infinite() {
                if let Some(sources) = self.sources.as_mut() {
                    for source in [&mut sources.color, &mut sources.mask] {
                        source.seek(tick.position);
                        if let Err(e) = source.play() {
                            tracing::warn!(stream = %source.role(), error = %e, "Restart rejected");
                        }
                    }
                }
            }
        }

        if self.seek.is_none() {
            let cycle = repeat.is_infinite().then_some(self.clock.duration());
            self.sync_sources(tick.position, cycle, now);
        }

        if self.time_update_throttle.should_tick(now) {
            self.events.emit(&PlayerEvent::TimeUpdate {
                position: tick.position,
            });
        }

        if self.seek.is_none() {
            self.render_frame();
        }
    }

    /// Pull drifting sources back onto the clock, then onto each other.
    fn sync_sources(&mut self, target: f64, cycle: Option<f64>, now: f64) {
        let Some(sources) = self.sources.as_mut() else {
            return;
        };

        let mut nudged = false;
        for source in [&mut sources.color, &mut sources.mask] {
            if source.is_seeking() {
                continue;
            }
            let drift = position_distance(source.position(), target, cycle);
            if drift > SYNC_THRESHOLD_SECS {
                tracing::debug!(
                    stream = %source.role(),
                    drift_ms = drift * 1000.0,
                    target,
                    "Nudging source onto shared clock"
                );
                source.seek(target);
                self.stats.sync_corrections += 1;
                nudged = true;
            }
        }
        if nudged || sources.any_seeking() {
            return;
        }

        // Both are close to the target but may sit on opposite sides of it.
        // Color is the master: pin the mask to it and move the clock along.
        let measurement = DriftMeasurement {
            reference_secs: sources.color.position(),
            measured_secs: sources.mask.position(),
        };
        let pair_drift =
            position_distance(measurement.reference_secs, measurement.measured_secs, cycle);
        if pair_drift > SYNC_THRESHOLD_SECS {
            tracing::debug!(drift_ms = measurement.drift_ms(), "Pinning mask to color");
            sources.mask.seek(measurement.reference_secs);
            self.clock.resync_looping(measurement.reference_secs, now);
            self.stats.drift_corrections += 1;
        }
    }

    fn render_frame(&mut self) {
        let outcome = {
            let (Some(sources), Some(surface)) = (self.sources.as_mut(), self.surface.as_mut())
            else {
                return;
            };
            if sources.any_seeking() {
                self.stats.frames_skipped += 1;
                return;
            }
            let Some(compositor) = self.compositor.as_mut() else {
                self.stats.frames_skipped += 1;
                return;
            };
            let (Some(color), Some(mask)) =
                (sources.color.current_frame(), sources.mask.current_frame())
            else {
                self.stats.frames_skipped += 1;
                return;
            };
            compositor.render(&FrameInput { color, mask }, surface.as_mut())
        };

        match outcome {
            Ok(RenderOutcome::Drawn) => {
                self.stats.frames_rendered += 1;
                self.repaint_pending = false;
            }
            Ok(RenderOutcome::Skipped) => {
                self.stats.frames_skipped += 1;
                self.repaint_pending = false;
            }
            Ok(RenderOutcome::ContextLost) => {
                self.stats.frames_skipped += 1;
                self.drop_gpu_backend();
            }
            Err(err) => self.fall_back_to_software(err),
        }
    }

    fn refresh_size(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let input = SizingInput {
            fixed_size: self.config.fixed_size,
            max_size: self.config.max_size,
            auto_size: self.config.auto_size,
            natural_size: self.natural_size,
            device_pixel_ratio: surface.device_pixel_ratio(),
            container_constrained: surface.container_constrained(),
        };
        let Some(size) = self.size_tracker.update(sizing::resolve(&input)) else {
            return;
        };
        surface.apply_size(&size);
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.resize(&size);
        }
        tracing::debug!(
            pixel_width = size.pixel_width,
            pixel_height = size.pixel_height,
            scale = size.scale,
            "Output size changed"
        );
        self.events.emit(&PlayerEvent::SizeChange(size));
    }

    fn finish_playback(&mut self, position: f64) {
        if let Some(sources) = self.sources.as_mut() {
            sources.color.pause();
            sources.mask.pause();
        }
        self.state = PlayerState::Ended;
        tracing::info!(
            iterations = self.clock.completed_iterations(),
            "Playback ended"
        );
        self.events.emit(&PlayerEvent::TimeUpdate { position });
        self.events.emit(&PlayerEvent::Ended);
    }

    fn release_sources(&mut self) {
        if let Some(mut pair) = self.sources.take() {
            for source in [&mut pair.color, &mut pair.mask] {
                if let Err(e) = source.release() {
                    tracing::warn!(stream = %source.role(), error = %e, "Failed to release source");
                }
            }
        }
    }

    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&PlayerEvent) + 'static,
    ) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    /// Start or resume playback.
    ///
    /// Before the player is ready this records the intent to play. A
    /// decoder refusing to play is logged, not reported.
    pub fn play(&mut self) {
        match self.state {
            PlayerState::Destroyed | PlayerState::Playing => {}
            PlayerState::Uninitialized | PlayerState::Initializing => {
                tracing::debug!("Play requested before ready; deferring");
                self.play_intent = true;
            }
            PlayerState::Ended => {
                tracing::debug!("Play ignored after end of playback; reset first");
            }
            PlayerState::Ready | PlayerState::Paused => self.start_playback(),
        }
    }

    fn start_playback(&mut self) {
        if !self.clock.repeat().allows_playback() {
            tracing::info!("Repeat count is 0; not starting playback");
            return;
        }
        let now = self.time.now_secs();
        self.clock.start(now);
        if let Some(sources) = self.sources.as_mut() {
            for source in [&mut sources.color, &mut sources.mask] {
                if let Err(e) = source.play() {
                    tracing::warn!(
                        stream = %source.role(),
                        error = %e,
                        "Play request rejected; keeping playing intent"
                    );
                }
            }
        }
        self.state = PlayerState::Playing;
        self.frame_throttle.reset();
        self.time_update_throttle.reset();
        tracing::info!(position = self.clock.target_position(now), "Playing");
        self.events.emit(&PlayerEvent::Play);
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let now = self.time.now_secs();
        self.clock.stop(now);
        if let Some(sources) = self.sources.as_mut() {
            sources.color.pause();
            sources.mask.pause();
        }
        self.state = PlayerState::Paused;
        tracing::info!(position = self.clock.target_position(now), "Paused");
        self.events.emit(&PlayerEvent::Pause);
    }

    /// Move both sources to `position`, clamped into the duration.
    ///
    /// Compositing pauses until both sources report the seek complete (or
    /// [`SEEK_TIMEOUT_SECS`] passes). Before ready, the position becomes
    /// the start position.
    pub fn seek(&mut self, position: f64) -> PlayerResult<()> {
        if !position.is_finite() {
            return Err(PlayerError::invalid_input(format!(
                "seek position must be finite, got {position}"
            )));
        }
        match self.state {
            PlayerState::Destroyed => return Ok(()),
            PlayerState::Uninitialized | PlayerState::Initializing => {
                self.pending_start = Some(position.max(0.0));
                return Ok(());
            }
            _ => {}
        }

        let now = self.time.now_secs();
        self.clock.seek_to(position, now);
        let target = self.clock.target_position(now);
        if let Some(sources) = self.sources.as_mut() {
            sources.color.seek(target);
            sources.mask.seek(target);
        }
        self.seek = Some(SeekState {
            target,
            started: now,
        });
        self.stats.seeks += 1;
        tracing::debug!(target, "Seeking");
        Ok(())
    }

    /// Return to position 0 with the repeat iterations reset, in `Ready`.
    pub fn reset(&mut self) {
        match self.state {
            PlayerState::Destroyed => return,
            PlayerState::Uninitialized | PlayerState::Initializing => {
                self.pending_start = Some(0.0);
                return;
            }
            _ => {}
        }
        let now = self.time.now_secs();
        self.clock.reset();
        if let Some(sources) = self.sources.as_mut() {
            for source in [&mut sources.color, &mut sources.mask] {
                source.pause();
                source.seek(0.0);
            }
        }
        self.seek = Some(SeekState {
            target: 0.0,
            started: now,
        });
        self.state = PlayerState::Ready;
        self.repaint_pending = true;
        tracing::info!("Player reset");
    }

    /// Set the color stream's volume (0-1). The mask stays silent.
    pub fn set_volume(&mut self, volume: f64) -> PlayerResult<()> {
        if !volume.is_finite() {
            return Err(PlayerError::invalid_input("volume must be finite"));
        }
        if self.state == PlayerState::Destroyed {
            return Ok(());
        }
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sources) = self.sources.as_mut() {
            sources.color.set_volume(self.volume);
            sources.mask.set_volume(0.0);
        }
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Set the playback rate, silently clamped to 0.25-4. Returns the
    /// applied rate.
    pub fn set_playback_rate(&mut self, rate: f64) -> PlayerResult<f64> {
        if rate.is_nan() {
            return Err(PlayerError::invalid_input("playback rate must be a number"));
        }
        if self.state == PlayerState::Destroyed {
            return Ok(self.clock.rate());
        }
        let now = self.time.now_secs();
        let applied = self.clock.set_rate(rate, now);
        if let Some(sources) = self.sources.as_mut() {
            sources.color.set_rate(applied);
            sources.mask.set_rate(applied);
        }
        tracing::debug!(requested = rate, applied, "Playback rate changed");
        Ok(applied)
    }

    pub fn playback_rate(&self) -> f64 {
        self.clock.rate()
    }

    pub fn current_time(&self) -> f64 {
        self.clock.target_position(self.time.now_secs())
    }

    /// Effective duration (shorter of the two streams), once ready.
    pub fn duration(&self) -> Option<f64> {
        self.effective_duration
    }

    /// Ranges buffered in both streams.
    pub fn buffered_ranges(&self) -> Vec<TimeRange> {
        match &self.sources {
            Some(sources) => intersect(&sources.color.buffered(), &sources.mask.buffered()),
            None => Vec::new(),
        }
    }

    /// `true` loops forever, `false` plays once.
    pub fn set_loop(&mut self, enabled: bool) {
        let policy = if enabled {
            RepeatPolicy::Infinite
        } else {
            RepeatPolicy::Once
        };
        self.apply_repeat(policy);
    }

    pub fn is_looping(&self) -> bool {
        self.clock.repeat().is_infinite()
    }

    /// `-1` infinite, `0` none (pauses if playing), `1` once, `n` finite.
    pub fn set_repeat_count(&mut self, count: i32) -> PlayerResult<()> {
        let policy = RepeatPolicy::from_count(count)?;
        self.apply_repeat(policy);
        Ok(())
    }

    pub fn repeat_count(&self) -> i32 {
        self.clock.repeat().count()
    }

    fn apply_repeat(&mut self, policy: RepeatPolicy) {
        if self.state == PlayerState::Destroyed {
            return;
        }
        self.clock.set_repeat(policy, self.time.now_secs());
        if let Some(sources) = self.sources.as_mut() {
            sources.color.set_native_loop(policy.is_infinite());
            sources.mask.set_native_loop(policy.is_infinite());
        }
        tracing::debug!(count = policy.count(), "Repeat policy changed");
        if !policy.allows_playback() && self.state == PlayerState::Playing {
            tracing::info!("Repeat count set to 0; pausing");
            self.pause();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn is_paused(&self) -> bool {
        matches!(
            self.state,
            PlayerState::Ready | PlayerState::Paused | PlayerState::Ended
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.state,
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused | PlayerState::Ended
        )
    }

    pub fn natural_width(&self) -> Option<u32> {
        self.natural_size.map(|(w, _)| w)
    }

    pub fn natural_height(&self) -> Option<u32> {
        self.natural_size.map(|(_, h)| h)
    }

    /// Install a fixed presentation size.
    pub fn set_size(&mut self, width: f64, height: f64) -> PlayerResult<()> {
        let size = Size::new(width, height);
        if !size.is_valid() {
            return Err(PlayerError::invalid_input(format!(
                "size must be positive and finite, got {width}x{height}"
            )));
        }
        if self.state == PlayerState::Destroyed {
            return Ok(());
        }
        self.config.fixed_size = Some(size);
        self.refresh_size();
        Ok(())
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            completed_iterations: self.clock.completed_iterations(),
            backend: self.compositor.as_ref().map(|c| c.kind()),
            ..self.stats
        }
    }

    /// Release everything. Later calls do nothing.
    pub fn destroy(&mut self) {
        if self.state == PlayerState::Destroyed {
            return;
        }
        let previous = self.state;
        self.state = PlayerState::Destroyed;
        self.clock.stop(self.time.now_secs());
        self.seek = None;
        self.pipeline = None;
        self.surface_waiter = None;
        self.release_sources();
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
        }
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
        self.lifecycle.disconnect();
        self.events.clear();
        self.on_ready = None;
        self.on_error = None;
        if let Some(tx) = self.init_tx.take() {
            if tx.borrow().is_pending() {
                tx.send_replace(InitStatus::Cancelled);
            }
        }
        tracing::info!(%previous, "Player destroyed");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}
