//! AlphaPlay CLI: simulate synchronized color/mask playback.
//!
//! Usage:
//!   alphaplay simulate [OPTIONS]     Play a synthetic pair and print a summary
//!   alphaplay still <COLOR> <MASK>   Composite an image pair to a PNG
//!   alphaplay check-config [PATH]    Validate a config file
//!   alphaplay info                   Show build and default settings

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "alphaplay",
    about = "Synchronized color + mask video playback with per-pixel transparency",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a synthetic color/mask pair and report what happened
    Simulate {
        /// Seconds of playback to simulate
        #[arg(long, default_value = "5.0")]
        seconds: f64,

        /// Color stream duration (seconds)
        #[arg(long, default_value = "10.0")]
        duration: f64,

        /// Mask stream duration (defaults to the color duration)
        #[arg(long)]
        mask_duration: Option<f64>,

        /// Mask decoder clock error (0.01 = 1% fast)
        #[arg(long, default_value = "0.0")]
        mask_skew: f64,

        /// Playback rate (clamped to 0.25-4)
        #[arg(long)]
        rate: Option<f64>,

        /// Repeat count: -1 infinite, 0 none, n finite
        #[arg(long, allow_hyphen_values = true)]
        repeat: Option<i32>,

        /// Seek to this position once ready
        #[arg(long)]
        seek: Option<f64>,

        /// Fail initialization when the durations differ
        #[arg(long)]
        strict: bool,

        /// Force the software compositor
        #[arg(long)]
        software: bool,

        /// Pace ticks with the wall clock instead of simulated time
        #[arg(long)]
        realtime: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Composite a color image and a mask image into a transparent PNG
    Still {
        /// Color image
        color: PathBuf,

        /// Grayscale mask image (luminance becomes alpha)
        mask: PathBuf,

        /// Output PNG path
        #[arg(short, long, default_value = "composite.png")]
        output: PathBuf,
    },

    /// Validate a config file and print the effective settings
    CheckConfig {
        /// Path to the config file
        path: Option<PathBuf>,
    },

    /// Show version and default settings
    Info,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tool_config = match &cli.config {
        Some(path) => alphaplay_common::config::ToolConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => alphaplay_common::config::ToolConfig::load(),
    };

    let mut logging = tool_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    alphaplay_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Simulate {
            seconds,
            duration,
            mask_duration,
            mask_skew,
            rate,
            repeat,
            seek,
            strict,
            software,
            realtime,
            json,
        } => {
            let options = commands::simulate::SimulateOptions {
                seconds,
                duration,
                mask_duration: mask_duration.unwrap_or(duration),
                mask_skew,
                rate,
                repeat,
                seek,
                strict,
                software,
                realtime,
            };
            commands::simulate::run(tool_config.player, options, json).await
        }
        Commands::Still {
            color,
            mask,
            output,
        } => commands::still::run(color, mask, output),
        Commands::CheckConfig { path } => commands::check_config::run(path.or(cli.config)),
        Commands::Info => commands::info::run(&tool_config),
    }
}
