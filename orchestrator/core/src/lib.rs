// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! missionlog core
//!
//! Event-sourced mission log: idempotent step append, a fixed step schedule,
//! an aggregate projected from the log, copy-on-write forks and read-side
//! replay.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** `domain` (types, projection, repository and collaborator
//!   traits), `application` (ledger, tick/fork engines, mission service,
//!   scripted driver, replay), `infrastructure` (stores, LLM adapters,
//!   rankers, event bus), `presentation` (HTTP API)

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
