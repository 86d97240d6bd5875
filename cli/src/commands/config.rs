// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use missionlog_core::domain::config::{
    GeneratorProvider, MissionlogConfig, RankerStrategy, StoreBackendKind, CONFIG_PATH_ENV,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./missionlog-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = MissionlogConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./missionlog-config.yaml");
        println!("  4. ~/.missionlog/config.yaml");
        println!("  5. /etc/missionlog/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let store = &config.spec.store;
    println!("{}", "Store:".bold());
    match store.backend {
        StoreBackendKind::Memory => println!("  Backend: memory"),
        StoreBackendKind::Postgres => {
            println!("  Backend: postgres");
            // Literal URLs may carry credentials.
            let url = store.database_url.as_deref().unwrap_or("(none)");
            if url.starts_with("env:") {
                println!("  Database URL: {}", url);
            } else {
                println!("  Database URL: {}", "(set)".dimmed());
            }
            println!("  Max connections: {}", store.max_connections);
        }
    }
    println!("  Operation timeout: {}ms", store.operation_timeout_ms);
    println!();

    let engine = &config.spec.engine;
    println!("{}", "Engine:".bold());
    println!("  Context window: {}", engine.context_window);
    println!("  Top-k: {}", engine.top_k);
    println!("  Scripted interval: {}ms", engine.scripted_interval_ms);
    println!();

    let generator = &config.spec.generator;
    println!("{}", "Generator:".bold());
    match generator.provider {
        GeneratorProvider::None => println!("  Provider: none (default content only)"),
        provider => {
            println!("  Provider: {:?}", provider);
            println!("  Endpoint: {}", generator.endpoint.as_deref().unwrap_or("(none)"));
            println!("  Model: {}", generator.model.as_deref().unwrap_or("(none)"));
        }
    }
    println!("  Timeout: {}ms", generator.timeout_ms);
    println!();

    let ranker = &config.spec.ranker;
    println!("{}", "Ranker:".bold());
    println!("  Strategy: {:?}", ranker.strategy);
    if ranker.strategy == RankerStrategy::Http {
        println!("  Endpoint: {}", ranker.endpoint.as_deref().unwrap_or("(none)"));
    }
    println!("  Timeout: {}ms", ranker.timeout_ms);
    println!();

    let network = &config.spec.network;
    let observability = &config.spec.observability;
    println!("{}", "Network:".bold());
    println!("  Listen: {}:{}", network.bind_address, network.port);
    println!(
        "  Logging: {} ({})",
        observability.logging.level, observability.logging.format
    );
    if observability.metrics.enabled {
        println!("  Metrics: :{}", observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = MissionlogConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_parse_and_validate() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = MissionlogConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missionlog-config.yaml");
        generate(output.clone(), false).unwrap();

        let config = MissionlogConfig::from_yaml_file(&output).unwrap();
        assert_eq!(config.spec.store.backend, StoreBackendKind::Memory);
    }
}
