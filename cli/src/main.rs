// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # missionlog
//!
//! Event-sourced mission log: a fixed schedule of agent steps recorded as an
//! append-only log, with ticking, forking, recovery and replay.
//!
//! ## Commands
//!
//! - `missionlog serve` - Run the HTTP daemon (and the scripted drivers)
//! - `missionlog mission start|show|list|emit|tick|fork|recover|replay|watch` - Daemon client
//! - `missionlog config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use missionlog::commands::{self, ConfigCommand, MissionCommand};
use missionlog::daemon::{self, ServeOptions};
use missionlog_core::domain::config::{LoggingConfig, MissionlogConfig};

/// missionlog - event-sourced mission core
#[derive(Parser)]
#[command(name = "missionlog")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "MISSIONLOG_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Daemon port used by client commands
    #[arg(long, global = true, env = "MISSIONLOG_PORT", default_value = "8000")]
    port: u16,

    /// Daemon host used by client commands
    #[arg(long, global = true, env = "MISSIONLOG_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error). Defaults to the config file.
    #[arg(long, global = true, env = "MISSIONLOG_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json). Defaults to the config file.
    #[arg(long, global = true, env = "MISSIONLOG_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP daemon
    #[command(name = "serve")]
    Serve {
        /// Bind address (overrides spec.network.bind_address)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Listen port (overrides spec.network.port)
        #[arg(long, value_name = "PORT")]
        listen_port: Option<u16>,
    },

    /// Mission operations against a running daemon
    #[command(name = "mission")]
    Mission {
        #[command(subcommand)]
        command: MissionCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let logging = logging_settings(&cli);
    init_logging(&logging)?;

    match cli.command {
        Some(Commands::Serve { bind, listen_port }) => {
            let options = ServeOptions {
                bind_address: bind,
                port: listen_port,
            };
            daemon::start_daemon(cli.config, options).await
        }
        Some(Commands::Mission { command }) => {
            commands::mission::handle_command(command, &cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Flags and environment win; otherwise the config file's
/// `spec.observability.logging` applies. The config is read before the
/// subscriber exists, so its own load messages are not emitted here.
fn logging_settings(cli: &Cli) -> LoggingConfig {
    let from_config = MissionlogConfig::load_or_default(cli.config.clone())
        .map(|c| c.spec.observability.logging)
        .unwrap_or_default();

    LoggingConfig {
        level: cli.log_level.clone().unwrap_or(from_config.level),
        format: cli.log_format.clone().unwrap_or(from_config.format),
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(settings: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match settings.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
