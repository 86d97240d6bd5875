// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context Ranker
//!
//! `ContextRanker` implementations.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Choose the prior summaries fed to the content generator
//!
//! - **LexicalContextRanker** scores each candidate by term overlap with the
//!   query plus a recency weight, then re-ranks by that combined score.
//! - **HttpContextRanker** delegates to an external ranking service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::ranking::{ContextRanker, RankerError};

/// Weight of recency relative to one overlapping term.
const RECENCY_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalContextRanker;

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl ContextRanker for LexicalContextRanker {
    async fn rank(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, RankerError> {
        let query_terms = terms(query);
        let len = candidates.len().max(1) as f64;

        let mut scored: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| {
                let overlap = terms(candidate).intersection(&query_terms).count() as f64;
                let recency = (idx + 1) as f64 / len;
                (idx, overlap + RECENCY_WEIGHT * recency)
            })
            .collect();

        // Ties go to the newer candidate.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.cmp(&a.0))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(idx, _)| candidates[idx].clone())
            .collect())
    }
}

#[derive(Serialize)]
struct RankRequest<'a> {
    query: &'a str,
    candidates: &'a [String],
    top_k: usize,
}

#[derive(Deserialize)]
struct RankResponse {
    /// Indices into the submitted candidates, best first
    indices: Vec<usize>,
}

pub struct HttpContextRanker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpContextRanker {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, RankerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RankerError::Unavailable(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ContextRanker for HttpContextRanker {
    async fn rank(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, RankerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RankRequest {
                query,
                candidates,
                top_k,
            })
            .send()
            .await
            .map_err(|e| RankerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RankerError::Unavailable(format!("HTTP {}", response.status())));
        }

        let body: RankResponse = response
            .json()
            .await
            .map_err(|e| RankerError::InvalidResponse(e.to_string()))?;

        body.indices
            .into_iter()
            .take(top_k)
            .map(|idx| {
                candidates.get(idx).cloned().ok_or_else(|| {
                    RankerError::InvalidResponse(format!("index {} out of range", idx))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summaries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lexical_prefers_overlap_then_recency() {
        let candidates = summaries(&[
            "Queried the knowledge base for parser benchmarks",
            "Assigned research",
            "Build produced a partial result",
            "Noted two parser approaches",
        ]);

        let ranked = LexicalContextRanker
            .rank("reviewer note on parser approaches", &candidates, 2)
            .await
            .unwrap();

        assert_eq!(ranked[0], "Noted two parser approaches");
        assert_eq!(ranked[1], "Queried the knowledge base for parser benchmarks");
    }

    #[tokio::test]
    async fn test_lexical_without_overlap_is_most_recent() {
        let candidates = summaries(&["alpha", "beta", "gamma"]);
        let ranked = LexicalContextRanker.rank("zzz", &candidates, 2).await.unwrap();
        assert_eq!(ranked, summaries(&["gamma", "beta"]));
    }

    #[tokio::test]
    async fn test_http_ranker_maps_indices() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rank")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"top_k": 2})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"indices": [2, 0]}"#)
            .create_async()
            .await;

        let ranker =
            HttpContextRanker::new(format!("{}/rank", server.url()), Duration::from_secs(2)).unwrap();
        let ranked = ranker
            .rank("query", &summaries(&["a", "b", "c"]), 2)
            .await
            .unwrap();

        assert_eq!(ranked, summaries(&["c", "a"]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_ranker_rejects_bad_index() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"indices": [9]}"#)
            .create_async()
            .await;

        let ranker =
            HttpContextRanker::new(format!("{}/rank", server.url()), Duration::from_secs(2)).unwrap();
        let err = ranker.rank("q", &summaries(&["a"]), 1).await.unwrap_err();
        assert!(matches!(err, RankerError::InvalidResponse(_)));
    }
}
