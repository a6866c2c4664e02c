mod config;
mod device;
mod effects;
mod headless;
mod input;
mod parallax;
mod renderer;
mod scheduler;
mod spring;
mod stage;
mod stars;
mod wayland;

use clap::Parser;
use device::{DeviceMode, HostMetrics};
use log::{error, info};
use renderer::Extent;
use std::path::PathBuf;

/// HyprStars - An animated parallax starfield background for Wayland
#[derive(Parser, Debug)]
#[command(name = "hyprstars", version, about)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.config/hypr/hyprstars.toml")]
    config: String,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Render without a compositor (see --frames, --output, --trace)
    #[arg(long)]
    headless: bool,

    /// Headless: number of frames to render before exiting
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Headless: viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080")]
    size: Extent,

    /// Headless: write the last frame to this PPM file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Headless: replay input events from a JSON-lines trace
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// Treat the host as a mobile device
    #[arg(long)]
    mobile: bool,

    /// List available effects
    #[arg(long)]
    list: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("HyprStars v{} starting", env!("CARGO_PKG_VERSION"));

    // List effects and exit
    if cli.list {
        effects::list_available();
        return;
    }

    // Load config
    let config_path = shellexpand(&cli.config);
    let mut cfg = match config::Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config from {}: {}", config_path, e);
            info!("Using default configuration");
            config::Config::default()
        }
    };
    if cli.mobile {
        cfg.general.device = DeviceMode::Mobile;
    }

    // The Wayland host replaces these with the real surface and output sizes
    let metrics = HostMetrics::new(cfg.general.user_agent.clone(), cli.size, cli.size);

    let result = if cli.headless {
        info!("Headless mode: {} frame(s) at {}", cli.frames, cli.size);
        headless::run(
            &cfg,
            metrics,
            headless::HeadlessOptions {
                frames: cli.frames,
                output: cli.output,
                trace: cli.trace,
            },
        )
    } else {
        wayland::run(&cfg, metrics)
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Expand ~ to home directory in paths
fn shellexpand(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return format!("{}/{}", home, stripped);
    }
    path.to_string()
}
