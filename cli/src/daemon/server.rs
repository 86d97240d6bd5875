// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use missionlog_core::application::repository_factory::build_mission_runtime;
use missionlog_core::domain::config::{MetricsConfig, MissionlogConfig};
use missionlog_core::presentation::api::{app, AppState};

/// Listener overrides from the command line. Unset fields fall back to
/// `spec.network`.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

pub async fn start_daemon(config_path: Option<PathBuf>, options: ServeOptions) -> Result<()> {
    info!("missionlog daemon starting (PID: {})", std::process::id());

    let config = MissionlogConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        node = %config.metadata.name,
        store = ?config.spec.store.backend,
        generator = ?config.spec.generator.provider,
        ranker = ?config.spec.ranker.strategy,
        "Configuration loaded"
    );

    install_metrics_exporter(&config.spec.observability.metrics)?;

    let runtime = build_mission_runtime(&config)
        .await
        .context("Failed to initialize mission runtime")?;

    runtime.scripted_driver.resume().await;

    let router = app(AppState {
        mission_service: runtime.mission_service.clone(),
        scripted_driver: Some(runtime.scripted_driver.clone()),
        event_bus: runtime.event_bus.clone(),
        started_at: Instant::now(),
    });

    let addr = listen_address(&config, &options);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Daemon shutting down");
    runtime.shutdown().await;

    served
}

fn listen_address(config: &MissionlogConfig, options: &ServeOptions) -> String {
    let host = options
        .bind_address
        .as_deref()
        .unwrap_or(&config.spec.network.bind_address);
    let port = options.port.unwrap_or(config.spec.network.port);
    format!("{}:{}", host, port)
}

fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
