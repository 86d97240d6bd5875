// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ranking
//!
//! Context ranker contract. A ranker picks the prior summaries most relevant
//! to the step about to be generated.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** `ContextRanker` collaborator interface plus the
//!   most-recent-K fallback selection

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("ranker timed out after {0} ms")]
    Timeout(u64),

    #[error("ranker unavailable: {0}")]
    Unavailable(String),

    #[error("invalid ranker response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ContextRanker: Send + Sync {
    /// Return at most `top_k` of `candidates`, best first. Candidates are
    /// ordered oldest to newest.
    async fn rank(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, RankerError>;
}

/// The `top_k` newest candidates, newest first.
pub fn most_recent(candidates: &[String], top_k: usize) -> Vec<String> {
    candidates.iter().rev().take(top_k).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_takes_tail_newest_first() {
        let candidates: Vec<String> = (1..=8).map(|i| format!("s{}", i)).collect();
        assert_eq!(
            most_recent(&candidates, 3),
            vec!["s8".to_string(), "s7".to_string(), "s6".to_string()]
        );
        assert_eq!(most_recent(&candidates[..2], 6).len(), 2);
    }
}
