use std::cell::{Cell, RefCell};
use std::rc::Rc;

use alphaplay_common::clock::{ManualTimeSource, TimeSource};
use alphaplay_common::config::PlayerConfig;
use alphaplay_common::error::{ErrorKind, PlayerError};
use alphaplay_media::synthetic::{SyntheticBackend, SyntheticHandle, SyntheticScript};
use alphaplay_media::MediaErrorCode;
use alphaplay_player::{
    EventKind, InitStatus, Player, PlayerEnvironment, PlayerEvent, PlayerOptions, PlayerState,
    SurfaceRef,
};
use alphaplay_render::headless::{HeadlessHandle, HeadlessSurface};
use alphaplay_render::{BackendKind, ComputedStyle, PresentationSurface};

const STEP: f64 = 1.0 / 60.0;
const COLOR: &str = "clip-color.webm";
const MASK: &str = "clip-mask.webm";

struct Rig {
    time: ManualTimeSource,
    media: SyntheticBackend,
    surface: HeadlessHandle,
    player: Player,
    events: Rc<RefCell<Vec<PlayerEvent>>>,
    errors: Rc<RefCell<Vec<ErrorKind>>>,
}

impl Rig {
    fn new(config: PlayerConfig) -> Self {
        Self::build(
            SyntheticScript::color(),
            SyntheticScript::mask(),
            config,
            |_| {},
        )
    }

    fn build(
        color: SyntheticScript,
        mask: SyntheticScript,
        config: PlayerConfig,
        prepare: impl FnOnce(&HeadlessHandle),
    ) -> Self {
        alphaplay_common::logging::init_test_logging();
        let time = ManualTimeSource::new(0.0);
        let shared: Rc<dyn TimeSource> = Rc::new(time.clone());
        let mut media = SyntheticBackend::new(shared.clone());
        media.script(COLOR, color);
        media.script(MASK, mask);

        let (surface, handle) = HeadlessSurface::new();
        prepare(&handle);

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let options = PlayerOptions::new(COLOR, MASK, SurfaceRef::Direct(Box::new(surface)))
            .with_config(config)
            .on_error(move |err| sink.borrow_mut().push(err.kind()));
        let mut player =
            Player::new(options, PlayerEnvironment::new(shared, media.clone())).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let events = events.clone();
            player.on(kind, move |event| events.borrow_mut().push(event.clone()));
        }

        Self {
            time,
            media,
            surface: handle,
            player,
            events,
            errors,
        }
    }

    fn tick(&mut self) {
        self.time.advance(STEP);
        self.player.tick();
    }

    fn run(&mut self, secs: f64) {
        let steps = (secs / STEP).round() as usize;
        for _ in 0..steps {
            self.tick();
        }
    }

    fn color(&self) -> SyntheticHandle {
        self.media.handle(COLOR).unwrap()
    }

    fn mask(&self) -> SyntheticHandle {
        self.media.handle(MASK).unwrap()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    fn warnings(&self) -> Vec<ErrorKind> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::Warning(err) => Some(err.kind()),
                _ => None,
            })
            .collect()
    }

    fn position_of(&self, kind: EventKind) -> Option<usize> {
        self.events
            .borrow()
            .iter()
            .position(|event| event.kind() == kind)
    }
}

fn paused_config() -> PlayerConfig {
    PlayerConfig {
        autoplay: false,
        ..PlayerConfig::default()
    }
}

#[test]
fn test_loads_both_sources_then_autoplays() {
    let mut rig = Rig::new(PlayerConfig::default());
    assert_eq!(rig.player.state(), PlayerState::Initializing);
    rig.run(0.5);

    assert!(rig.player.is_playing());
    assert!(rig.position_of(EventKind::Ready) < rig.position_of(EventKind::Play));
    assert_eq!(rig.count(EventKind::Ready), 1);
    assert_eq!(rig.player.duration(), Some(10.0));
    assert_eq!(rig.player.natural_width(), Some(64));
    assert_eq!(rig.player.natural_height(), Some(36));

    let now = rig.player.current_time();
    assert!(now > 0.3 && now < 0.5, "position {now}");
    assert!(rig.player.stats().frames_rendered > 0);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Gpu));

    assert_eq!(rig.color().volume(), 1.0);
    assert_eq!(rig.mask().volume(), 0.0);
    assert!(rig.color().native_loop());
    assert!(rig.mask().native_loop());
    assert!(rig.warnings().is_empty());
}

#[test]
fn test_poster_frame_without_autoplay() {
    let mut rig = Rig::new(paused_config());
    rig.run(0.5);

    assert_eq!(rig.player.state(), PlayerState::Ready);
    assert!(rig.player.is_paused());
    assert!(rig.player.is_ready());
    assert_eq!(rig.player.current_time(), 0.0);
    assert_eq!(rig.player.stats().frames_rendered, 1);
    assert_eq!(rig.count(EventKind::Play), 0);
}

#[test]
fn test_play_before_ready_is_deferred() {
    let mut rig = Rig::new(paused_config());
    rig.player.play();
    assert_eq!(rig.player.state(), PlayerState::Initializing);
    rig.run(0.3);
    assert!(rig.player.is_playing());
    assert_eq!(rig.count(EventKind::Play), 1);
}

#[test]
fn test_size_resolved_once_from_natural_size() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(1.0);

    assert_eq!(rig.count(EventKind::SizeChange), 1);
    let sizes = rig.surface.applied_sizes();
    assert_eq!(sizes.len(), 1);
    assert_eq!((sizes[0].pixel_width, sizes[0].pixel_height), (64, 36));
}

#[test]
fn test_fixed_size_scaled_by_pixel_ratio() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask(),
        paused_config(),
        |surface| surface.set_device_pixel_ratio(2.0),
    );
    rig.run(0.3);
    rig.player.set_size(200.0, 100.0).unwrap();

    let last = *rig.surface.applied_sizes().last().unwrap();
    assert_eq!((last.pixel_width, last.pixel_height), (400, 200));
    assert_eq!((last.css_width, last.css_height), (200.0, 100.0));
    assert!(matches!(
        rig.player.set_size(0.0, 100.0),
        Err(PlayerError::InvalidInput { .. })
    ));
}

#[test]
fn test_seek_converges_at_each_rate() {
    for rate in [0.5, 1.0, 2.0] {
        let mut rig = Rig::new(PlayerConfig {
            initial_rate: rate,
            ..PlayerConfig::default()
        });
        rig.run(0.5);
        rig.player.seek(4.0).unwrap();
        rig.run(0.5);

        assert_eq!(rig.count(EventKind::Seeked), 1, "rate {rate}");
        let seeked = rig.events.borrow().iter().find_map(|event| match event {
            PlayerEvent::Seeked { position } => Some(*position),
            _ => None,
        });
        assert_eq!(seeked, Some(4.0));

        let now = rig.player.current_time();
        let expected = 4.0 + 0.5 * rate;
        assert!((now - expected).abs() < 0.05, "rate {rate}: {now} vs {expected}");
        assert!((rig.color().position() - now).abs() <= 0.02, "rate {rate}");
        assert!((rig.mask().position() - now).abs() <= 0.02, "rate {rate}");
    }
}

#[test]
fn test_seek_before_ready_sets_start_position() {
    let mut rig = Rig::new(paused_config());
    rig.player.seek(3.0).unwrap();
    rig.run(0.5);

    assert_eq!(rig.player.state(), PlayerState::Ready);
    assert_eq!(rig.player.current_time(), 3.0);
    assert_eq!(rig.color().position(), 3.0);
    assert_eq!(rig.mask().position(), 3.0);
    assert_eq!(rig.count(EventKind::Seeked), 1);
    assert_eq!(rig.player.stats().frames_rendered, 1);
}

#[test]
fn test_seek_clamps_and_rejects_non_finite() {
    let mut rig = Rig::new(paused_config());
    rig.run(0.3);
    assert!(matches!(
        rig.player.seek(f64::NAN),
        Err(PlayerError::InvalidInput { .. })
    ));
    rig.player.seek(-5.0).unwrap();
    assert_eq!(rig.player.current_time(), 0.0);
    rig.player.seek(50.0).unwrap();
    assert_eq!(rig.player.current_time(), 10.0);
}

#[test]
fn test_repeat_count_round_trip() {
    let mut rig = Rig::new(paused_config());
    for count in [-1, 0, 1, 5] {
        rig.player.set_repeat_count(count).unwrap();
        assert_eq!(rig.player.repeat_count(), count);
    }
    assert!(rig.player.set_repeat_count(-2).is_err());
    assert_eq!(rig.player.repeat_count(), 5);

    rig.player.set_loop(true);
    assert!(rig.player.is_looping());
    assert_eq!(rig.player.repeat_count(), -1);
    rig.player.set_loop(false);
    assert!(!rig.player.is_looping());
    assert_eq!(rig.player.repeat_count(), 1);
}

#[test]
fn test_finite_repeat_ends_after_last_iteration() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_duration(1.0),
        SyntheticScript::mask().with_duration(1.0),
        PlayerConfig {
            repeat_count: 2,
            ..PlayerConfig::default()
        },
        |_| {},
    );
    assert!(!rig.color().native_loop());
    rig.run(3.0);

    assert_eq!(rig.player.state(), PlayerState::Ended);
    assert_eq!(rig.count(EventKind::Ended), 1);
    assert_eq!(rig.player.stats().completed_iterations, 2);
    assert_eq!(rig.player.current_time(), 1.0);
    assert!(rig.player.is_paused());
    assert!(!rig.color().is_playing());

    rig.player.play();
    assert_eq!(rig.player.state(), PlayerState::Ended);

    rig.player.reset();
    assert_eq!(rig.player.state(), PlayerState::Ready);
    assert_eq!(rig.player.current_time(), 0.0);
    assert_eq!(rig.player.stats().completed_iterations, 0);
    rig.player.play();
    assert!(rig.player.is_playing());
}

#[test]
fn test_repeat_change_while_looping_counts_from_now() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_duration(1.0),
        SyntheticScript::mask().with_duration(1.0),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(3.5);
    let looped = rig.player.stats().completed_iterations;
    assert!(looped >= 3, "looped {looped}");

    rig.player.set_repeat_count(2).unwrap();
    assert!(!rig.color().native_loop());
    rig.run(0.3);
    assert!(rig.player.is_playing());
    assert_eq!(rig.count(EventKind::Ended), 0);

    rig.run(2.5);
    assert_eq!(rig.player.state(), PlayerState::Ended);
    assert_eq!(rig.count(EventKind::Ended), 1);
    assert_eq!(rig.player.stats().completed_iterations, looped + 2);
}

#[test]
fn test_repeat_zero_while_playing_pauses() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.5);
    assert!(rig.player.is_playing());

    rig.player.set_repeat_count(0).unwrap();
    assert_eq!(rig.player.state(), PlayerState::Paused);
    assert_eq!(rig.count(EventKind::Pause), 1);
    assert!(!rig.color().is_playing());

    let frames = rig.player.stats().frames_rendered;
    rig.run(0.5);
    assert_eq!(rig.player.stats().frames_rendered, frames);

    rig.player.play();
    assert_eq!(rig.player.state(), PlayerState::Paused);
}

#[test]
fn test_stuck_seek_is_cleared_after_timeout() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_seek_latency(1.5),
        SyntheticScript::mask().with_seek_latency(1.5),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(0.5);
    assert!(rig.player.is_playing());
    rig.player.seek(4.0).unwrap();
    let frames = rig.player.stats().frames_rendered;

    rig.run(0.9);
    assert_eq!(rig.count(EventKind::Seeked), 0);
    assert_eq!(rig.player.stats().frames_rendered, frames);

    rig.run(0.3);
    assert_eq!(rig.count(EventKind::Seeked), 1);
    assert!(rig.player.is_playing());

    // Once the decoders settle, compositing resumes without another seek.
    rig.run(2.5);
    assert_eq!(rig.count(EventKind::Seeked), 1);
    assert!(rig.player.stats().frames_rendered > frames);
}

#[test]
fn test_rejected_play_keeps_playing_intent() {
    let mut rig = Rig::build(
        SyntheticScript::color().rejecting_play(),
        SyntheticScript::mask().rejecting_play(),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(0.5);

    assert_eq!(rig.player.state(), PlayerState::Playing);
    assert_eq!(rig.count(EventKind::Play), 1);
    assert_eq!(rig.count(EventKind::Error), 0);
    assert!(rig.errors.borrow().is_empty());
    assert!(rig.color().play_calls() >= 1);
    assert!(!rig.color().is_playing());
}

#[test]
fn test_playback_rate_clamped() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);

    assert_eq!(rig.player.set_playback_rate(10.0).unwrap(), 4.0);
    assert_eq!(rig.player.playback_rate(), 4.0);
    assert_eq!(rig.color().rate(), 4.0);
    assert_eq!(rig.player.set_playback_rate(0.1).unwrap(), 0.25);
    assert_eq!(rig.mask().rate(), 0.25);
    assert!(rig.player.set_playback_rate(f64::NAN).is_err());
    assert_eq!(rig.player.playback_rate(), 0.25);
}

#[test]
fn test_volume_only_reaches_color_stream() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    rig.player.set_volume(0.5).unwrap();
    assert_eq!(rig.player.volume(), 0.5);
    assert_eq!(rig.color().volume(), 0.5);
    assert_eq!(rig.mask().volume(), 0.0);
    assert!(rig.player.set_volume(f64::INFINITY).is_err());
}

#[test]
fn test_small_duration_mismatch_warns_and_uses_shorter() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_duration(10.0),
        SyntheticScript::mask().with_duration(10.05),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(0.5);

    assert!(rig.player.is_playing());
    assert_eq!(rig.player.duration(), Some(10.0));
    assert_eq!(rig.warnings(), vec![ErrorKind::DurationMismatch]);
}

#[test]
fn test_strict_duration_mismatch_fails_load() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_duration(10.0),
        SyntheticScript::mask().with_duration(12.0),
        PlayerConfig {
            strict_duration: true,
            ..PlayerConfig::default()
        },
        |_| {},
    );
    let ticket = rig.player.initialize();
    rig.run(0.5);

    assert_eq!(rig.count(EventKind::Ready), 0);
    assert_eq!(rig.count(EventKind::Error), 1);
    assert_eq!(*rig.errors.borrow(), vec![ErrorKind::DurationMismatch]);
    assert_eq!(rig.player.state(), PlayerState::Uninitialized);
    assert!(matches!(ticket.status(), InitStatus::Failed(_)));
    assert!(rig.color().is_released());
    assert!(rig.mask().is_released());
}

#[test]
fn test_dimension_mismatch_is_a_warning() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_size(64, 36),
        SyntheticScript::mask().with_size(32, 18),
        paused_config(),
        |_| {},
    );
    rig.run(0.3);
    assert!(rig.player.is_ready());
    assert_eq!(rig.warnings(), vec![ErrorKind::DimensionMismatch]);
}

#[test]
fn test_concurrent_initialize_shares_one_load() {
    let mut rig = Rig::new(paused_config());
    let first = rig.player.initialize();
    let second = rig.player.initialize();
    assert_eq!(rig.media.open_count(), 2);
    assert!(first.status().is_pending());

    rig.run(0.3);
    assert!(first.status().is_ready());
    assert!(second.status().is_ready());
    assert!(rig.player.initialize().status().is_ready());
    assert_eq!(rig.media.open_count(), 2);
}

#[tokio::test]
async fn test_init_ticket_wait_resolves() {
    let mut rig = Rig::new(paused_config());
    let mut ticket = rig.player.initialize();
    rig.run(0.3);
    assert!(ticket.wait().await.is_ready());
}

#[test]
fn test_failed_load_reports_error_and_allows_retry() {
    let mut rig = Rig::build(
        SyntheticScript::color().with_failure(0.05, MediaErrorCode::Network),
        SyntheticScript::mask(),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(0.5);
    assert_eq!(rig.player.state(), PlayerState::Uninitialized);
    assert_eq!(*rig.errors.borrow(), vec![ErrorKind::LoadFailed]);
    assert_eq!(rig.count(EventKind::Error), 1);

    let ticket = rig.player.initialize();
    assert!(ticket.status().is_pending());
    assert_eq!(rig.media.open_count(), 4);
}

#[test]
fn test_load_timeout() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask().never_ready(),
        PlayerConfig {
            load_timeout_secs: 0.5,
            ..PlayerConfig::default()
        },
        |_| {},
    );
    rig.run(0.4);
    assert_eq!(rig.player.state(), PlayerState::Initializing);
    rig.run(0.2);
    assert_eq!(*rig.errors.borrow(), vec![ErrorKind::LoadTimeout]);
}

#[test]
fn test_transient_runtime_error_becomes_warning() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    rig.color().set_error_code(MediaErrorCode::Decode);
    rig.color().raise_error();
    rig.run(0.5);

    assert!(rig.player.is_playing());
    assert_eq!(rig.warnings(), vec![ErrorKind::TransientDecode]);
    assert_eq!(rig.count(EventKind::Error), 0);
}

#[test]
fn test_gpu_loss_and_restore() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Gpu));

    rig.surface.lose_context();
    rig.run(0.2);
    assert_eq!(rig.player.stats().backend, None);
    let rendered = rig.player.stats().frames_rendered;
    let skipped = rig.player.stats().frames_skipped;
    rig.run(0.2);
    assert_eq!(rig.player.stats().frames_rendered, rendered);
    assert!(rig.player.stats().frames_skipped > skipped);

    rig.surface.restore_context();
    rig.run(0.3);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Gpu));
    assert_eq!(rig.surface.created_contexts().len(), 2);
    assert!(rig.player.stats().frames_rendered > rendered);
    assert!(rig.player.is_playing());
}

#[test]
fn test_restore_without_gpu_falls_back_to_software() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Gpu));

    rig.surface.lose_context();
    rig.run(0.2);
    assert_eq!(rig.player.stats().backend, None);
    let rendered = rig.player.stats().frames_rendered;

    rig.surface.set_gpu_apis(&[]);
    rig.surface.restore_context();
    rig.run(0.3);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Software));
    assert_eq!(rig.surface.created_contexts().len(), 1);
    assert!(rig.player.stats().frames_rendered > rendered);
    assert!(rig.player.is_playing());
}

#[test]
fn test_software_fallback_when_gpu_unavailable() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask(),
        PlayerConfig::default(),
        |surface| surface.set_gpu_apis(&[]),
    );
    rig.run(0.5);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Software));
    assert!(rig.warnings().is_empty());
    assert!(rig.surface.presented_count() > 0);
    assert_eq!(rig.surface.last_presented_size(), Some((64, 36)));
}

#[test]
fn test_explicit_gpu_request_warns_on_fallback() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask(),
        PlayerConfig {
            use_gpu_backend: Some(true),
            ..PlayerConfig::default()
        },
        |surface| surface.set_gpu_apis(&[]),
    );
    rig.run(0.3);
    assert_eq!(rig.player.stats().backend, Some(BackendKind::Software));
    assert_eq!(rig.warnings(), vec![ErrorKind::GpuInitFailed]);
}

#[test]
fn test_drifting_source_is_nudged_back() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask().with_clock_skew(0.05),
        PlayerConfig::default(),
        |_| {},
    );
    rig.run(2.0);

    assert!(rig.player.stats().sync_corrections >= 1);
    let now = rig.player.current_time();
    // A nudge may still be in flight, holding the mask at its seek target.
    assert!((rig.mask().position() - now).abs() < 0.1);
    assert!((rig.color().position() - now).abs() <= 0.02);
}

#[test]
fn test_opposite_drift_pins_mask_to_color() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.5);
    let before = rig.player.stats();

    let now = rig.player.current_time();
    rig.color().force_position(now - 0.01);
    rig.mask().force_position(now + 0.01);
    rig.tick();

    let after = rig.player.stats();
    assert_eq!(after.drift_corrections, before.drift_corrections + 1);
    assert_eq!(after.sync_corrections, before.sync_corrections);
    assert_eq!(rig.mask().seek_count(), 1);
}

#[test]
fn test_hidden_surface_skips_frame_work() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);

    rig.surface.set_style(ComputedStyle {
        display_none: true,
        ..ComputedStyle::VISIBLE
    });
    rig.run(0.3);
    let frames = rig.player.stats().frames_rendered;
    let hidden = rig.player.stats().hidden_ticks;
    rig.run(0.5);
    assert_eq!(rig.player.stats().frames_rendered, frames);
    assert!(rig.player.stats().hidden_ticks > hidden);
    assert!(rig.player.is_playing());

    rig.surface.set_style(ComputedStyle::VISIBLE);
    rig.run(0.5);
    assert!(rig.player.stats().frames_rendered > frames);
}

#[test]
fn test_hidden_surface_still_renders_when_not_pausing() {
    let mut rig = Rig::build(
        SyntheticScript::color(),
        SyntheticScript::mask(),
        PlayerConfig {
            pause_when_hidden: false,
            ..PlayerConfig::default()
        },
        |surface| {
            surface.set_style(ComputedStyle {
                opacity: 0.0,
                ..ComputedStyle::VISIBLE
            })
        },
    );
    rig.run(0.5);
    assert_eq!(rig.player.stats().hidden_ticks, 0);
    assert!(rig.player.stats().frames_rendered > 0);
}

#[test]
fn test_detached_surface_pauses_with_one_warning() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    rig.surface.set_attached(false);
    rig.run(0.5);

    assert_eq!(rig.player.state(), PlayerState::Paused);
    assert_eq!(rig.count(EventKind::Pause), 1);
    assert_eq!(rig.warnings(), vec![ErrorKind::SurfaceDetached]);
}

#[test]
fn test_destroy_releases_once() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.3);
    let recorder = rig.surface.current_recorder().unwrap();

    rig.player.destroy();
    rig.player.destroy();
    assert_eq!(rig.player.state(), PlayerState::Destroyed);
    assert!(rig.color().is_released());
    assert!(rig.mask().is_released());
    assert!(rig.surface.is_released());
    assert_eq!(recorder.release_count(), 1);

    rig.run(0.2);
    rig.player.play();
    assert_eq!(rig.player.state(), PlayerState::Destroyed);
    assert!(matches!(
        rig.player.initialize().status(),
        InitStatus::Cancelled
    ));
}

#[test]
fn test_destroyed_player_ignores_setters_and_stops_clock() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.run(0.5);
    rig.player.set_volume(0.7).unwrap();
    rig.player.destroy();
    let position = rig.player.current_time();

    assert_eq!(rig.player.set_playback_rate(2.0).unwrap(), 1.0);
    rig.player.set_volume(0.2).unwrap();
    rig.run(0.5);

    assert_eq!(rig.player.playback_rate(), 1.0);
    assert_eq!(rig.player.volume(), 0.7);
    assert_eq!(rig.player.current_time(), position);
    assert_eq!(rig.player.state(), PlayerState::Destroyed);
}

#[test]
fn test_destroy_cancels_pending_initialization() {
    let mut rig = Rig::new(PlayerConfig::default());
    let ticket = rig.player.initialize();
    rig.player.destroy();
    assert!(matches!(ticket.status(), InitStatus::Cancelled));
    assert_eq!(rig.count(EventKind::Ready), 0);
}

#[test]
fn test_panicking_listener_does_not_stop_playback() {
    let mut rig = Rig::new(PlayerConfig::default());
    rig.player.on(EventKind::TimeUpdate, |_| panic!("listener bug"));
    rig.run(0.5);
    assert!(rig.player.is_playing());
    assert!(rig.count(EventKind::TimeUpdate) > 0);
}

#[test]
fn test_buffered_ranges_cover_both_streams() {
    let mut rig = Rig::new(paused_config());
    assert!(rig.player.buffered_ranges().is_empty());
    rig.run(0.3);
    let ranges = rig.player.buffered_ranges();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].start, 0.0);
    assert_eq!(ranges[0].end, 10.0);
}

#[test]
fn test_rejects_bad_options() {
    let time: Rc<dyn TimeSource> = Rc::new(ManualTimeSource::new(0.0));
    let media = SyntheticBackend::new(time.clone());

    let (surface, _) = HeadlessSurface::new();
    let empty = PlayerOptions::new(" ", MASK, SurfaceRef::Direct(Box::new(surface)));
    assert!(matches!(
        Player::new(empty, PlayerEnvironment::new(time.clone(), media.clone())),
        Err(PlayerError::InvalidInput { .. })
    ));

    let (surface, _) = HeadlessSurface::new();
    let bad_rate = PlayerOptions::new(COLOR, MASK, SurfaceRef::Direct(Box::new(surface)))
        .with_config(PlayerConfig {
            target_frame_rate: 0,
            ..PlayerConfig::default()
        });
    assert!(Player::new(bad_rate, PlayerEnvironment::new(time.clone(), media.clone())).is_err());

    let missing = PlayerOptions::new(COLOR, MASK, SurfaceRef::lookup("stage"));
    assert!(matches!(
        Player::new(missing, PlayerEnvironment::new(time, media)),
        Err(PlayerError::InvalidInput { .. })
    ));
}

#[test]
fn test_waits_for_late_surface() {
    let time = ManualTimeSource::new(0.0);
    let shared: Rc<dyn TimeSource> = Rc::new(time.clone());
    let mut media = SyntheticBackend::new(shared.clone());
    media.script(COLOR, SyntheticScript::color());
    media.script(MASK, SyntheticScript::mask());

    let available = Rc::new(Cell::new(false));
    let flag = available.clone();
    let reference = SurfaceRef::resolver(move || {
        flag.get()
            .then(|| Box::new(HeadlessSurface::new().0) as Box<dyn PresentationSurface>)
    });
    let options = PlayerOptions::new(COLOR, MASK, reference).with_config(PlayerConfig {
        wait_for_surface: true,
        surface_timeout_secs: 2.0,
        ..paused_config()
    });
    let mut player = Player::new(options, PlayerEnvironment::new(shared, media)).unwrap();

    for _ in 0..30 {
        time.advance(STEP);
        player.tick();
    }
    assert_eq!(player.state(), PlayerState::Initializing);

    available.set(true);
    for _ in 0..10 {
        time.advance(STEP);
        player.tick();
    }
    assert!(player.is_ready());
}

#[test]
fn test_on_ready_callback_runs_once() {
    let time = ManualTimeSource::new(0.0);
    let shared: Rc<dyn TimeSource> = Rc::new(time.clone());
    let mut media = SyntheticBackend::new(shared.clone());
    media.script(COLOR, SyntheticScript::color());
    media.script(MASK, SyntheticScript::mask());

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let (surface, _) = HeadlessSurface::new();
    let options = PlayerOptions::new(COLOR, MASK, SurfaceRef::Direct(Box::new(surface)))
        .on_ready(move || counter.set(counter.get() + 1));
    let mut player = Player::new(options, PlayerEnvironment::new(shared, media)).unwrap();
    for _ in 0..60 {
        time.advance(STEP);
        player.tick();
    }
    assert_eq!(calls.get(), 1);
}
