// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod errors;
pub mod ledger;
pub mod tick_engine;
pub mod fork_engine;
pub mod mission_service;
pub mod scripted_driver;
pub mod replay;
pub mod repository_factory;

// Re-export use cases for convenience
pub use errors::MissionError;
pub use mission_service::{
    EmitEvent, EmitOutcome, MissionService, MissionWithEvents, StandardMissionService, StartMission,
};
pub use replay::{MissionViewer, ReplaySession, ReplaySpeed};
pub use repository_factory::{build_mission_runtime, MissionRuntime};
pub use tick_engine::{TickEngine, TickOutcome, TickSettings};
