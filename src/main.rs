/*
 * This file is part of Terrarium.
 *
 * Copyright (C) 2025 Terrarium contributors
 *
 * Terrarium is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Terrarium is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Terrarium. If not, see <https://www.gnu.org/licenses/>.
 */

//! Terrarium daemon
//!
//! Regulates temperature, humidity and air quality in an enclosure through a
//! serial-attached microcontroller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use terrarium::config::{config_path, load_config};
use terrarium::logger::{init_logging, log_level_from_env};
use terrarium::service::{self, Shutdown};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("terrarium {} - enclosure climate regulator", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    terrarium [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Configuration file (default /etc/terrarium/config.json)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    TERRARIUM_LOG              Log filter (trace, debug, info, warn, error)");
    eprintln!("    TERRARIUM_CONFIG           Configuration file when --config is not given");
    eprintln!("    TS_LOGS_WRITE_API_KEY      Telemetry write key");
    eprintln!("    TS_SETTINGS_CHANNEL_ID     Settings channel id");
    eprintln!("    TS_SETTINGS_READ_API_KEY   Settings channel read key");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // PHASE 1: Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut cli_config: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("terrarium {}", VERSION);
                return Ok(());
            }
            "-c" | "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                };
                cli_config = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // PHASE 2: Logging
    let log_level = log_level_from_env();
    let target = init_logging(&log_level);
    info!("STARTUP: terrarium {} starting", VERSION);
    info!("STARTUP: Logging to {} (level {})", target, log_level);

    // PHASE 3: Configuration
    let path = config_path(cli_config.as_deref());
    let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
    info!("STARTUP: Configuration from {}", path.display());

    // PHASE 4: Signal handling
    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        signal_shutdown.trigger();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    // PHASE 5: Run until shutdown
    if let Err(e) = service::run(config, shutdown).await {
        error!("Service error: {}", e);
        return Err(e.into());
    }

    info!("SHUTDOWN: terrarium stopped");
    Ok(())
}
