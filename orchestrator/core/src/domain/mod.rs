// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain model for missions and their step logs.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, value objects, collaborator contracts and
//!   repository interfaces

pub mod config;
pub mod content;
pub mod events;
pub mod llm;
pub mod mission;
pub mod projection;
pub mod ranking;
pub mod repository;
pub mod schedule;
pub mod step_event;
