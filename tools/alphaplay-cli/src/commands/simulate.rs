//! Play a synthetic color/mask pair through the full player.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use alphaplay_common::clock::{ManualTimeSource, TimeSource};
use alphaplay_common::config::PlayerConfig;
use alphaplay_media::synthetic::{SyntheticBackend, SyntheticScript};
use alphaplay_player::{
    EventKind, FrameLoop, Player, PlayerEnvironment, PlayerEvent, PlayerOptions, PlayerState,
    PlayerStats, SurfaceRef, TokioTimeSource,
};
use alphaplay_render::headless::{HeadlessHandle, HeadlessSurface};
use serde::Serialize;

const COLOR_LOCATOR: &str = "synthetic://color";
const MASK_LOCATOR: &str = "synthetic://mask";
const SIMULATED_HZ: f64 = 60.0;

pub struct SimulateOptions {
    pub seconds: f64,
    pub duration: f64,
    pub mask_duration: f64,
    pub mask_skew: f64,
    pub rate: Option<f64>,
    pub repeat: Option<i32>,
    pub seek: Option<f64>,
    pub strict: bool,
    pub software: bool,
    pub realtime: bool,
}

#[derive(Debug, Default)]
struct EventTally {
    counts: BTreeMap<&'static str, usize>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    generated_at: String,
    mode: &'static str,
    state: PlayerState,
    position_secs: f64,
    duration_secs: Option<f64>,
    playback_rate: f64,
    repeat_count: i32,
    frames_presented: u64,
    stats: PlayerStats,
    events: BTreeMap<&'static str, usize>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

pub async fn run(
    mut config: PlayerConfig,
    options: SimulateOptions,
    json: bool,
) -> anyhow::Result<()> {
    if !options.seconds.is_finite() || options.seconds <= 0.0 {
        anyhow::bail!("--seconds must be a positive number");
    }
    if let Some(rate) = options.rate {
        config.initial_rate = rate;
    }
    if let Some(repeat) = options.repeat {
        config.repeat_count = repeat;
    }
    if options.strict {
        config.strict_duration = true;
    }
    if options.software {
        config.use_gpu_backend = Some(false);
    }
    config.validate()?;

    tracing::info!(
        seconds = options.seconds,
        realtime = options.realtime,
        "Starting simulated playback"
    );

    let summary = if options.realtime {
        let time: Rc<dyn TimeSource> = Rc::new(TokioTimeSource::start());
        let (player, surface, tally) = build_player(config, &options, time)?;
        let player = Rc::new(RefCell::new(player));
        let limit = Duration::from_secs_f64(options.seconds);
        let local = tokio::task::LocalSet::new();
        let ticks = local
            .run_until(FrameLoop::default().run(player.clone(), Some(limit)))
            .await;
        tracing::debug!(ticks, "Realtime loop finished");
        let mut player = player.borrow_mut();
        summarize("realtime", &mut player, &surface, &tally)
    } else {
        let clock = ManualTimeSource::new(0.0);
        let time: Rc<dyn TimeSource> = Rc::new(clock.clone());
        let (mut player, surface, tally) = build_player(config, &options, time)?;
        let steps = (options.seconds * SIMULATED_HZ).ceil() as u64;
        for _ in 0..steps {
            clock.advance(1.0 / SIMULATED_HZ);
            player.tick();
        }
        summarize("simulated", &mut player, &surface, &tally)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn build_player(
    config: PlayerConfig,
    options: &SimulateOptions,
    time: Rc<dyn TimeSource>,
) -> anyhow::Result<(Player, HeadlessHandle, Rc<RefCell<EventTally>>)> {
    let mut media = SyntheticBackend::new(time.clone());
    media.script(
        COLOR_LOCATOR,
        SyntheticScript::color()
            .with_size(320, 180)
            .with_duration(options.duration),
    );
    media.script(
        MASK_LOCATOR,
        SyntheticScript::mask()
            .with_size(320, 180)
            .with_duration(options.mask_duration)
            .with_clock_skew(options.mask_skew),
    );

    let (surface, handle) = HeadlessSurface::new();
    let tally = Rc::new(RefCell::new(EventTally::default()));
    let errors = tally.clone();
    let player_options = PlayerOptions::new(
        COLOR_LOCATOR,
        MASK_LOCATOR,
        SurfaceRef::Direct(Box::new(surface)),
    )
    .with_config(config)
    .on_error(move |err| errors.borrow_mut().errors.push(err.to_string()));

    let mut player = Player::new(player_options, PlayerEnvironment::new(time, media))?;
    for kind in EventKind::ALL {
        let tally = tally.clone();
        player.on(kind, move |event| {
            let mut tally = tally.borrow_mut();
            *tally.counts.entry(kind.name()).or_default() += 1;
            if let PlayerEvent::Warning(warning) = event {
                tally.warnings.push(warning.to_string());
            }
        });
    }
    if let Some(position) = options.seek {
        player.seek(position)?;
    }
    Ok((player, handle, tally))
}

fn summarize(
    mode: &'static str,
    player: &mut Player,
    surface: &HeadlessHandle,
    tally: &Rc<RefCell<EventTally>>,
) -> Summary {
    let summary = Summary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        mode,
        state: player.state(),
        position_secs: player.current_time(),
        duration_secs: player.duration(),
        playback_rate: player.playback_rate(),
        repeat_count: player.repeat_count(),
        frames_presented: surface.frames_drawn(),
        stats: player.stats(),
        events: tally.borrow().counts.clone(),
        warnings: tally.borrow().warnings.clone(),
        errors: tally.borrow().errors.clone(),
    };
    player.destroy();
    summary
}

fn print_summary(summary: &Summary) {
    println!("AlphaPlay simulation ({})", summary.mode);
    println!("{}", "=".repeat(50));
    println!("  State: {:?}", summary.state);
    match summary.duration_secs {
        Some(duration) => println!(
            "  Position: {:.3}s / {:.3}s",
            summary.position_secs, duration
        ),
        None => println!("  Position: {:.3}s (not loaded)", summary.position_secs),
    }
    println!(
        "  Rate: {}x, repeat: {}",
        summary.playback_rate, summary.repeat_count
    );
    println!();

    let stats = &summary.stats;
    println!("Rendering:");
    match stats.backend {
        Some(backend) => println!("  Backend: {backend}"),
        None => println!("  Backend: none"),
    }
    println!(
        "  Frames: {} rendered, {} skipped, {} presented",
        stats.frames_rendered, stats.frames_skipped, summary.frames_presented
    );
    println!("  Hidden ticks: {}", stats.hidden_ticks);
    println!();

    println!("Sync:");
    println!("  Seeks: {}", stats.seeks);
    println!("  Clock corrections: {}", stats.sync_corrections);
    println!("  Pair drift corrections: {}", stats.drift_corrections);
    println!("  Completed iterations: {}", stats.completed_iterations);
    println!();

    println!("Events:");
    for (name, count) in &summary.events {
        println!("  {name}: {count}");
    }
    for warning in &summary.warnings {
        println!("[WARN] {warning}");
    }
    for error in &summary.errors {
        println!("[ERROR] {error}");
    }
}
