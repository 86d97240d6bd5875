// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use missionlog_core::application::mission_service::{EmitOutcome, MissionWithEvents};
use missionlog_core::application::tick_engine::TickOutcome;
use missionlog_core::domain::mission::{Mission, MissionId, RunMode};

/// Wire form accepted by `POST /api/missions/{id}/events`.
#[derive(Debug, Clone, Serialize)]
pub struct EmitEventBody {
    pub step: u32,
    pub agent: String,
    pub kind: String,
    pub summary: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkResponse {
    pub mission_id: MissionId,
    pub parent_mission_id: MissionId,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        // No global timeout: `watch` keeps polling for as long as the mission runs.
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw health check; status interpretation is left to the caller.
    pub async fn health(&self) -> reqwest::Result<Response> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
    }

    pub async fn start_mission(&self, title: Option<String>, run_mode: RunMode) -> Result<Mission> {
        let response = self
            .client
            .post(format!("{}/api/missions", self.base_url))
            .json(&json!({ "title": title, "run_mode": run_mode.as_str() }))
            .send()
            .await
            .context("Failed to start mission")?;
        parse(response, "start mission").await
    }

    pub async fn list_missions(&self) -> Result<Vec<Mission>> {
        let response = self
            .client
            .get(format!("{}/api/missions", self.base_url))
            .send()
            .await
            .context("Failed to list missions")?;
        parse(response, "list missions").await
    }

    pub async fn get_mission(&self, id: MissionId) -> Result<MissionWithEvents> {
        let response = self
            .client
            .get(format!("{}/api/missions/{}", self.base_url, id))
            .send()
            .await
            .context("Failed to get mission")?;
        parse(response, "get mission").await
    }

    pub async fn emit_event(&self, id: MissionId, body: &EmitEventBody) -> Result<EmitOutcome> {
        let response = self
            .client
            .post(format!("{}/api/missions/{}/events", self.base_url, id))
            .json(body)
            .send()
            .await
            .context("Failed to emit event")?;
        parse(response, "emit event").await
    }

    pub async fn tick(&self, id: MissionId) -> Result<TickOutcome> {
        let response = self
            .client
            .post(format!("{}/api/missions/{}/tick", self.base_url, id))
            .send()
            .await
            .context("Failed to tick mission")?;
        parse(response, "tick").await
    }

    pub async fn fork(&self, id: MissionId, step: u32) -> Result<ForkResponse> {
        let response = self
            .client
            .post(format!("{}/api/missions/{}/fork", self.base_url, id))
            .json(&json!({ "step": step }))
            .send()
            .await
            .context("Failed to fork mission")?;
        parse(response, "fork").await
    }

    pub async fn recover(&self, id: MissionId) -> Result<Mission> {
        let response = self
            .client
            .post(format!("{}/api/missions/{}/recover", self.base_url, id))
            .send()
            .await
            .context("Failed to recover mission")?;
        parse(response, "recover").await
    }
}

fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => anyhow::bail!("Failed to {} ({}): {} [{}]", action, status, body.error, body.code),
            Err(_) => anyhow::bail!("Failed to {} ({}): {}", action, status, text),
        }
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> DaemonClient {
        let url = server.url();
        let (host, port) = url.rsplit_once(':').unwrap();
        DaemonClient::new(host, port.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_base_url_accepts_scheme_or_bare_host() {
        assert_eq!(base_url("127.0.0.1", 8000), "http://127.0.0.1:8000");
        assert_eq!(base_url("https://ops.local/", 443), "https://ops.local:443");
    }

    #[tokio::test]
    async fn test_fork_posts_step() {
        let mut server = mockito::Server::new_async().await;
        let parent = MissionId::new();
        let child = MissionId::new();
        let mock = server
            .mock("POST", format!("/api/missions/{}/fork", parent).as_str())
            .match_body(Matcher::Json(json!({"step": 7})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"mission_id": child, "parent_mission_id": parent}).to_string(),
            )
            .create_async()
            .await;

        let response = client_for(&server).fork(parent, 7).await.unwrap();
        assert_eq!(response.mission_id, child);
        assert_eq!(response.parent_mission_id, parent);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let id = MissionId::new();
        server
            .mock("POST", format!("/api/missions/{}/tick", id).as_str())
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": "mission not found", "code": "not_found", "retryable": false})
                    .to_string(),
            )
            .create_async()
            .await;

        let err = client_for(&server).tick(id).await.unwrap_err().to_string();
        assert!(err.contains("mission not found"));
        assert!(err.contains("not_found"));
    }
}
