pub mod events;
pub mod focus;
pub mod gaze;
pub mod scoring;
pub mod sequence;
pub mod session;
pub mod settings;
pub mod simulation;
pub mod tasks;
pub mod timer;
mod utils;

use std::path::PathBuf;

use anyhow::Context;

use settings::SettingsStore;
use simulation::SimulationOptions;

const SETTINGS_ENV: &str = "LECOG_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "lecog-settings.json";

/// Runs one simulated assessment session and prints its record as JSON.
pub fn run() -> anyhow::Result<()> {
    // Info by default; LECOG_DEBUG=1 lowers it, RUST_LOG directives win over both.
    let level = match std::env::var("LECOG_DEBUG").as_deref() {
        Ok("1") => log::LevelFilter::Debug,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    log::info!("lecog starting up...");

    let settings_path = std::env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let store = SettingsStore::new(settings_path)?;
    let settings = store.settings();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;
    let record = runtime.block_on(simulation::run_session(
        &settings,
        SimulationOptions::default(),
    ))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
