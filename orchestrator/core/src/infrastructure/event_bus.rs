// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Kill Switch Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (logs, the daemon, tests) follow kill switch runs through it.
//
// In-memory only: events are lost on restart. The audit store is the
// durable record, not this bus.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::KillSwitchEvent;
use crate::domain::node::NodeId;

/// Event bus for publishing and subscribing to kill switch events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<KillSwitchEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: KillSwitchEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all kill switch events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single node
    pub fn subscribe_node(&self, node_id: NodeId) -> NodeEventReceiver {
        NodeEventReceiver {
            receiver: self.sender.subscribe(),
            node_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
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

/// Receiver for all kill switch events
pub struct EventReceiver {
    receiver: broadcast::Receiver<KillSwitchEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<KillSwitchEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<KillSwitchEvent, EventBusError> {
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

/// Receiver for a single node's events (filtered)
pub struct NodeEventReceiver {
    receiver: broadcast::Receiver<KillSwitchEvent>,
    node_id: NodeId,
}

impl NodeEventReceiver {
    pub async fn recv(&mut self) -> Result<KillSwitchEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.node_id() == self.node_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::IgnoredBecause;
    use crate::domain::node::OperatorId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let node_id = NodeId::new();
        event_bus.publish(KillSwitchEvent::RunStarted {
            node_id,
            operator_id: OperatorId::new("op"),
            transition_revision: 2,
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            KillSwitchEvent::RunStarted { node_id: id, transition_revision, .. } => {
                assert_eq!(id, node_id);
                assert_eq!(transition_revision, 2);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_event_filtering() {
        let event_bus = EventBus::new(10);
        let node_id = NodeId::new();
        let mut receiver = event_bus.subscribe_node(node_id);

        event_bus.publish(KillSwitchEvent::TransitionIgnored {
            node_id: NodeId::new(),
            reason: IgnoredBecause::AlreadySuspended,
            observed_at: Utc::now(),
        });
        event_bus.publish(KillSwitchEvent::TransitionIgnored {
            node_id,
            reason: IgnoredBecause::NewlyCreated,
            observed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            KillSwitchEvent::TransitionIgnored { node_id: id, reason, .. } => {
                assert_eq!(id, node_id);
                assert_eq!(reason, IgnoredBecause::NewlyCreated);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 1);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
