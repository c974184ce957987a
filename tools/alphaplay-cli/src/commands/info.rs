//! Show version and default settings.

use alphaplay_common::config::{config_file_path, ToolConfig};
use alphaplay_common::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE, SYNC_THRESHOLD_SECS};
use alphaplay_media::ERROR_GRACE_SECS;
use alphaplay_player::lifecycle::VISIBILITY_POLL_SECS;
use alphaplay_player::SEEK_TIMEOUT_SECS;
use alphaplay_render::gpu::GpuApi;
use alphaplay_render::BackendPreference;

pub fn run(config: &ToolConfig) -> anyhow::Result<()> {
    let player = &config.player;

    println!("AlphaPlay {}", env!("CARGO_PKG_VERSION"));
    println!("{}", "=".repeat(50));
    println!("Config file: {}", config_file_path().display());
    println!();

    println!("Backends:");
    let apis: Vec<String> = GpuApi::PREFERENCE.iter().map(ToString::to_string).collect();
    println!("  GPU API preference: {}", apis.join(" > "));
    println!(
        "  Configured backend: {:?}",
        BackendPreference::from_flag(player.use_gpu_backend)
    );
    println!();

    println!("Playback:");
    println!("  Target frame rate: {}Hz", player.target_frame_rate);
    println!(
        "  Rate: {} (accepted {MIN_PLAYBACK_RATE}-{MAX_PLAYBACK_RATE})",
        player.initial_rate
    );
    println!("  Repeat count: {}", player.repeat_count);
    println!("  Autoplay: {}", player.autoplay);
    println!("  Pause when hidden: {}", player.pause_when_hidden);
    println!();

    println!("Sync tolerances:");
    println!("  Drift threshold: {:.0}ms", SYNC_THRESHOLD_SECS * 1000.0);
    println!("  Error grace window: {:.0}ms", ERROR_GRACE_SECS * 1000.0);
    println!("  Seek timeout: {SEEK_TIMEOUT_SECS:.1}s");
    println!("  Visibility poll: {:.0}ms", VISIBILITY_POLL_SECS * 1000.0);
    println!("  Load timeout: {:.1}s", player.load_timeout_secs);

    Ok(())
}
