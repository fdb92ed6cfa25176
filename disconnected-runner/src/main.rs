use clap::Parser;
use disconnected_config::load_config;
use disconnected_runner::{app, AppError};
use log::{error, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine configuration file (JSON, or TOML by extension)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Stop after this many ticks instead of waiting for Ctrl+C
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let config = load_config(&args.config)?;
    info!("Using configuration from {}", args.config.display());

    let engine = app::from_config(&config)?.with_max_ticks(args.ticks);
    let running = engine.start()?;

    let stopper = running.stopper();
    ctrlc::set_handler(move || {
        info!("Interrupted, finishing the current tick");
        stopper.stop();
    })
    .map_err(|e| AppError::Signal(e.to_string()))?;

    let (_engine, stats) = running.join()?;
    stats.log_summary();
    Ok(())
}
