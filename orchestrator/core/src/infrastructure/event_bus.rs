// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Mission Event Bus - Pub/Sub for mission lifecycle notifications
//
// In-memory fan-out over a tokio broadcast channel. Observers (live viewers,
// the scripted driver, log streams) subscribe here instead of polling.
// Notifications are lost on restart; the event store stays authoritative.

use crate::domain::events::MissionLifecycleEvent;
use crate::domain::mission::MissionId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MissionLifecycleEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered notifications before slow
    /// receivers start lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: MissionLifecycleEvent) {
        debug!(mission_id = %event.mission_id(), "Publishing mission event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to mission event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to notifications for a single mission.
    pub fn subscribe_mission(&self, mission_id: MissionId) -> MissionEventReceiver {
        MissionEventReceiver {
            receiver: self.sender.subscribe(),
            mission_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<MissionLifecycleEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<MissionLifecycleEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<MissionLifecycleEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one mission
pub struct MissionEventReceiver {
    receiver: broadcast::Receiver<MissionLifecycleEvent>,
    mission_id: MissionId,
}

impl MissionEventReceiver {
    pub async fn recv(&mut self) -> Result<MissionLifecycleEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.mission_id() == self.mission_id {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mission::{MissionStatus, RunMode};
    use chrono::Utc;

    fn started(mission_id: MissionId) -> MissionLifecycleEvent {
        MissionLifecycleEvent::MissionStarted {
            mission_id,
            title: "Bus test".to_string(),
            run_mode: RunMode::Generated,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let mission_id = MissionId::new();

        bus.publish(started(mission_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.mission_id(), mission_id);
    }

    #[tokio::test]
    async fn test_mission_filter_skips_other_missions() {
        let bus = EventBus::new(10);
        let watched = MissionId::new();
        let mut receiver = bus.subscribe_mission(watched);

        bus.publish(started(MissionId::new()));
        bus.publish(MissionLifecycleEvent::MissionCompleted {
            mission_id: watched,
            status: MissionStatus::Done,
            completed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            MissionLifecycleEvent::MissionCompleted { mission_id, status, .. } => {
                assert_eq!(mission_id, watched);
                assert_eq!(status, MissionStatus::Done);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(started(MissionId::new()));

        let mut late = bus.subscribe();
        assert!(matches!(late.try_recv(), Err(EventBusError::Empty)));
    }
}
