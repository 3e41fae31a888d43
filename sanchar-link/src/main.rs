//! SancharLink daemon
//!
//! Listens for robot-net/1.0 commands on UDP, drives the motors and reports
//! status back to the most recent base station.

use sanchar_link::config::{AppConfig, ConfigSource};
use sanchar_link::error::{Error, Result};
use sanchar_link::motor::LoggingDriver;
use sanchar_link::SancharApp;
use std::env;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `sanchar-link <path>` (positional)
/// - `sanchar-link --config <path>` (flag-based)
/// - `sanchar-link -c <path>` (short flag)
///
/// Defaults to `/etc/sanchar.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/sanchar.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let (config, source) = AppConfig::load_or_default(&config_path)?;

    let filter = env_logger::Env::default().default_filter_or(config.logging.level.as_str());
    env_logger::Builder::from_env(filter).init();

    log::info!("SancharLink v{} starting...", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => log::info!("Using config: {}", config_path),
        ConfigSource::Defaults => log::warn!("Config {} not found, using defaults", config_path),
    }
    log::info!(
        "Protocol {} robot_id={} heartbeat={}ms",
        config.protocol.tag,
        config.protocol.robot_id,
        config.heartbeat.period_ms
    );

    let app = SancharApp::new(config, LoggingDriver::new())?;

    let shutdown = app.shutdown_handle();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.shutdown();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("SancharLink running on {}. Press Ctrl-C to stop.", app.local_addr()?);
    app.run()
}
