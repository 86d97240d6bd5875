// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mission command implementations
//!
//! Client subcommands over the daemon HTTP API.
//!
//! # Commands
//!
//! - `missionlog mission start` - Start a scripted or generated mission
//! - `missionlog mission show <id>` - Show a mission and its event log
//! - `missionlog mission list` - List recent missions
//! - `missionlog mission emit <id>` - Append one event
//! - `missionlog mission tick <id>` - Advance a generated mission
//! - `missionlog mission fork <id> --step N` - Branch from a step
//! - `missionlog mission recover <id>` - Rebuild the aggregate from the log
//! - `missionlog mission replay <id>` - Replay the log at a chosen speed
//! - `missionlog mission watch <id>` - Follow a mission until it settles

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use missionlog_core::application::mission_service::{EmitOutcome, MissionWithEvents};
use missionlog_core::application::replay::{MissionViewer, ReplaySpeed};
use missionlog_core::application::tick_engine::TickOutcome;
use missionlog_core::domain::mission::{Mission, MissionId, MissionStatus, RunMode};
use missionlog_core::domain::step_event::{AgentRole, EventKind, Provenance, StepEvent};

use crate::daemon::client::EmitEventBody;
use crate::daemon::{check_daemon_running, DaemonClient, DaemonStatus};

#[derive(Subcommand)]
pub enum MissionCommand {
    /// Start a new mission
    Start {
        /// Mission title
        #[arg(long, short = 't')]
        title: Option<String>,

        /// Run mode (scripted, generated)
        #[arg(long, short = 'm', default_value = "scripted")]
        mode: RunMode,
    },

    /// Show a mission and its events
    Show {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent missions
    List,

    /// Append an event at a step
    Emit {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        #[arg(long)]
        step: u32,

        #[arg(long)]
        agent: AgentRole,

        #[arg(long)]
        kind: EventKind,

        #[arg(long)]
        summary: String,

        /// Payload (JSON string or @file.json)
        #[arg(long, short = 'p', value_name = "JSON")]
        payload: Option<String>,

        #[arg(long)]
        provenance: Option<Provenance>,
    },

    /// Advance a generated mission by one step
    Tick {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        /// Number of ticks to run; stops early once the mission settles
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,
    },

    /// Fork a mission at a step
    Fork {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        /// Branch step (clamped to the parent's last recorded step)
        #[arg(long)]
        step: u32,
    },

    /// Rebuild a mission's aggregate from its event log
    Recover {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,
    },

    /// Replay a mission's log
    Replay {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        /// Playback speed (0.5x, 1x, 2x, 4x, 8x)
        #[arg(long, short = 's', default_value = "1x")]
        speed: ReplaySpeed,

        /// Start at the last checkpoint instead of step 1
        #[arg(long)]
        from_checkpoint: bool,
    },

    /// Follow a mission until it is no longer running
    Watch {
        #[arg(value_name = "MISSION_ID")]
        mission_id: MissionId,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
}

pub async fn handle_command(command: MissionCommand, host: &str, port: u16) -> Result<()> {
    let client = DaemonClient::new(host, port)?;
    if !ensure_daemon(&client).await {
        return Ok(());
    }

    match command {
        MissionCommand::Start { title, mode } => start(title, mode, &client).await,
        MissionCommand::Show { mission_id, json } => show(mission_id, json, &client).await,
        MissionCommand::List => list(&client).await,
        MissionCommand::Emit {
            mission_id,
            step,
            agent,
            kind,
            summary,
            payload,
            provenance,
        } => {
            let body = EmitEventBody {
                step,
                agent: agent.as_str().to_string(),
                kind: kind.as_str().to_string(),
                summary,
                payload: parse_payload(payload)?,
                provenance: provenance.map(|p| p.as_str().to_string()),
            };
            emit(mission_id, body, &client).await
        }
        MissionCommand::Tick { mission_id, count } => tick(mission_id, count, &client).await,
        MissionCommand::Fork { mission_id, step } => fork(mission_id, step, &client).await,
        MissionCommand::Recover { mission_id } => recover(mission_id, &client).await,
        MissionCommand::Replay {
            mission_id,
            speed,
            from_checkpoint,
        } => replay(mission_id, speed, from_checkpoint, &client).await,
        MissionCommand::Watch {
            mission_id,
            interval_ms,
        } => watch(mission_id, Duration::from_millis(interval_ms), &client).await,
    }
}

async fn ensure_daemon(client: &DaemonClient) -> bool {
    match check_daemon_running(client).await {
        Ok(DaemonStatus::Running { .. }) => true,
        Ok(DaemonStatus::Unhealthy { error }) => {
            println!(
                "{}",
                format!("⚠ Daemon at {} is unhealthy: {}", client.base_url(), error).yellow()
            );
            false
        }
        _ => {
            println!(
                "{}",
                format!("No missionlog daemon answering at {}.", client.base_url()).red()
            );
            println!("Run 'missionlog serve' to start it.");
            false
        }
    }
}

/// Accepts inline JSON or `@path` to a JSON file. Missing payload is `{}`.
fn parse_payload(raw: Option<String>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::json!({}));
    };

    let text = match raw.strip_prefix('@') {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read payload file: {:?}", path))?
        }
        None => raw,
    };
    serde_json::from_str(&text).context("Payload is not valid JSON")
}

fn status_label(status: MissionStatus) -> colored::ColoredString {
    match status {
        MissionStatus::Running => status.as_str().cyan(),
        MissionStatus::Done => status.as_str().green(),
        MissionStatus::Failed => status.as_str().red(),
    }
}

fn print_event(event: &StepEvent) {
    let provenance = match event.provenance {
        Provenance::Generated => event.provenance.as_str().normal(),
        Provenance::Fallback => event.provenance.as_str().yellow(),
        Provenance::Scripted => event.provenance.as_str().dimmed(),
    };
    println!(
        "  [{:>2}] {:<11} {:<11} {} ({})",
        event.step,
        event.agent.as_str(),
        event.kind.as_str().bold(),
        event.summary,
        provenance
    );
}

fn print_mission(mission: &Mission) {
    println!("{} {}", "Mission".bold(), mission.id);
    println!("  Title:   {}", mission.title);
    println!("  Status:  {}", status_label(mission.status));
    println!("  Mode:    {}", mission.run_mode);
    println!("  Step:    {}", mission.current_step);
    if let Some(summary) = &mission.artifacts.latest_summary {
        println!("  Latest checkpoint: {}", summary);
    }
    if let Some(lineage) = &mission.lineage {
        println!(
            "  Forked from {} at step {}",
            lineage.parent_mission_id, lineage.branch_from_step
        );
    }
}

async fn start(title: Option<String>, mode: RunMode, client: &DaemonClient) -> Result<()> {
    let mission = client.start_mission(title, mode).await?;
    println!("{}", format!("✓ Mission started: {}", mission.id).green());
    print_mission(&mission);
    Ok(())
}

async fn show(mission_id: MissionId, json: bool, client: &DaemonClient) -> Result<()> {
    let view = client.get_mission(mission_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_mission(&view.mission);
    println!();
    println!("{}", "Events:".bold());
    for event in &view.events {
        print_event(event);
    }
    Ok(())
}

async fn list(client: &DaemonClient) -> Result<()> {
    let missions = client.list_missions().await?;
    if missions.is_empty() {
        println!("No missions yet.");
        return Ok(());
    }

    for mission in &missions {
        println!(
            "{}  {:<8} {:<9} step {:>2}  {}",
            mission.id,
            status_label(mission.status),
            mission.run_mode.as_str(),
            mission.current_step,
            mission.title
        );
    }
    Ok(())
}

async fn emit(mission_id: MissionId, body: EmitEventBody, client: &DaemonClient) -> Result<()> {
    match client.emit_event(mission_id, &body).await? {
        EmitOutcome::Accepted { event } => {
            println!("{}", "✓ Event recorded".green());
            print_event(&event);
        }
        EmitOutcome::AlreadyExists { event } => {
            println!(
                "{}",
                format!("Step {} already recorded; keeping the stored event", event.step).yellow()
            );
            print_event(&event);
        }
    }
    Ok(())
}

async fn tick(mission_id: MissionId, count: u32, client: &DaemonClient) -> Result<()> {
    for _ in 0..count.max(1) {
        match client.tick(mission_id).await? {
            TickOutcome::Advanced { event } => print_event(&event),
            TickOutcome::Duplicate { event } => {
                println!("{}", "Step was already recorded by another writer".yellow());
                print_event(&event);
            }
            TickOutcome::Settled { status } => {
                println!("Mission is {}; nothing to advance.", status_label(status));
                break;
            }
        }
    }
    Ok(())
}

async fn fork(mission_id: MissionId, step: u32, client: &DaemonClient) -> Result<()> {
    let response = client.fork(mission_id, step).await?;
    let view = client.get_mission(response.mission_id).await?;
    println!("{}", format!("✓ Fork created: {}", response.mission_id).green());
    print_mission(&view.mission);
    Ok(())
}

async fn recover(mission_id: MissionId, client: &DaemonClient) -> Result<()> {
    let mission = client.recover(mission_id).await?;
    println!("{}", "✓ Aggregate rebuilt from the event log".green());
    print_mission(&mission);
    Ok(())
}

async fn replay(
    mission_id: MissionId,
    speed: ReplaySpeed,
    from_checkpoint: bool,
    client: &DaemonClient,
) -> Result<()> {
    let mut viewer = MissionViewer::new(mission_id);
    viewer.apply_live(client.get_mission(mission_id).await?);

    let Some(session) = viewer.enter_replay(from_checkpoint) else {
        println!("Nothing to replay.");
        return Ok(());
    };

    println!(
        "{}",
        format!("▶ Replaying {} events at {}", session.len(), speed).cyan()
    );
    for event in session.revealed() {
        print_event(event);
    }
    let revealed = session.play(speed, print_event).await;
    println!("{}", format!("■ Replay finished ({} revealed)", revealed).cyan());

    viewer.exit_replay();
    Ok(())
}

async fn watch(mission_id: MissionId, interval: Duration, client: &DaemonClient) -> Result<()> {
    let mut viewer = MissionViewer::new(mission_id);
    let mut printed = 0usize;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let snapshot = client.get_mission(mission_id).await?;
        if printed == 0 {
            print_mission(&snapshot.mission);
            println!();
        }
        viewer.apply_live(snapshot);

        let Some(MissionWithEvents { mission, events }) = viewer.live() else {
            continue;
        };
        for event in events.iter().skip(printed) {
            print_event(event);
        }
        printed = printed.max(events.len());

        if !mission.is_running() {
            println!("Mission is {}.", status_label(mission.status));
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_payload_inline_and_file() {
        assert_eq!(parse_payload(None).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_payload(Some(r#"{"assignee":"researcher"}"#.to_string())).unwrap(),
            serde_json::json!({"assignee": "researcher"})
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"checkpoint":{{"summary":"ok"}}}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(
            parse_payload(Some(arg)).unwrap()["checkpoint"]["summary"],
            "ok"
        );

        assert!(parse_payload(Some("not json".to_string())).is_err());
    }
}
