// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Serving the mission HTTP API (`missionlog serve`)
//! - HTTP health checks used by client subcommands

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::DaemonClient;
pub use server::{start_daemon, ServeOptions};

#[derive(Debug, Clone, PartialEq)]
pub enum DaemonStatus {
    Running {
        uptime: Option<u64>,
        scripted_drivers: Option<u64>,
    },
    Stopped,
    Unhealthy {
        error: String,
    },
}

/// Check if the daemon answers its health endpoint.
pub async fn check_daemon_running(client: &DaemonClient) -> Result<DaemonStatus> {
    let health = tokio::time::timeout(Duration::from_millis(500), client.health()).await;

    match health {
        Ok(Ok(resp)) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.unwrap_or_default();
            Ok(DaemonStatus::Running {
                uptime: body["uptime_seconds"].as_u64(),
                scripted_drivers: body["scripted_drivers"].as_u64(),
            })
        }
        Ok(Ok(resp)) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Ok(Err(_)) | Err(_) => Ok(DaemonStatus::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> DaemonClient {
        let url = server.url();
        let (host, port) = url.rsplit_once(':').unwrap();
        DaemonClient::new(host, port.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_running_daemon_reports_uptime() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"healthy","uptime_seconds":42,"scripted_drivers":3}"#)
            .create_async()
            .await;

        let status = check_daemon_running(&client_for(&server)).await.unwrap();
        assert_eq!(
            status,
            DaemonStatus::Running {
                uptime: Some(42),
                scripted_drivers: Some(3)
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_is_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let status = check_daemon_running(&client_for(&server)).await.unwrap();
        assert!(matches!(status, DaemonStatus::Unhealthy { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_stopped() {
        // Port 9 (discard) is closed on test hosts.
        let client = DaemonClient::new("127.0.0.1", 9).unwrap();
        assert_eq!(check_daemon_running(&client).await.unwrap(), DaemonStatus::Stopped);
    }
}
