// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Runtime Events
//
// In-memory event streaming over tokio broadcast channels. Walker lifecycle
// and memory tier events are published here; observers subscribe to all
// events or to the events of a single walker.
//
// Events are not persisted and are dropped when nobody is subscribed.

use crate::domain::anchor::AnchorId;
use crate::domain::events::{MemoryEvent, WalkerEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified runtime event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Walker(WalkerEvent),
    Memory(MemoryEvent),
}

/// Event bus for publishing and subscribing to runtime events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<RuntimeEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_walker_event(&self, event: WalkerEvent) {
        self.publish(RuntimeEvent::Walker(event));
    }

    pub fn publish_memory_event(&self, event: MemoryEvent) {
        self.publish(RuntimeEvent::Memory(event));
    }

    fn publish(&self, event: RuntimeEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all runtime events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single walker
    pub fn subscribe_walker(&self, walker_id: AnchorId) -> WalkerEventReceiver {
        WalkerEventReceiver {
            receiver: self.sender.subscribe(),
            walker_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all runtime events
pub struct EventReceiver {
    receiver: broadcast::Receiver<RuntimeEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<RuntimeEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<RuntimeEvent, EventBusError> {
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

/// Receiver for walker-specific events (filtered)
pub struct WalkerEventReceiver {
    receiver: broadcast::Receiver<RuntimeEvent>,
    walker_id: AnchorId,
}

impl WalkerEventReceiver {
    /// Receive the next event of the subscribed walker, skipping all others
    pub async fn recv(&mut self) -> Result<WalkerEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let RuntimeEvent::Walker(walker_event) = event {
                if walker_event.walker_id() == self.walker_id {
                    return Ok(walker_event);
                }
            }
        }
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

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
