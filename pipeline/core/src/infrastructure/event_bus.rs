// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Application domain events
//
// In-memory event streaming using tokio broadcast channels, so pollers and
// observers can react to lifecycle transitions without coupling to the
// services that produce them. Events lost on restart; replay comes from the
// event store, not the bus.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::application::ApplicationId;
use crate::domain::events::ApplicationEvent;

/// Event bus for publishing and subscribing to application events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ApplicationEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given buffered capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create an event bus with default capacity (1000).
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ApplicationEvent) {
        debug!(event = event.event_name(), aggregate_id = %event.aggregate_id, "publishing event");
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening");
        }
    }

    /// Subscribe to all application events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe filtered to a single aggregate id.
    pub fn subscribe_application(&self, id: ApplicationId) -> ApplicationEventReceiver {
        ApplicationEventReceiver {
            receiver: self.sender.subscribe(),
            id,
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

/// Receiver for all application events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ApplicationEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<ApplicationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<ApplicationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one aggregate's events.
pub struct ApplicationEventReceiver {
    receiver: broadcast::Receiver<ApplicationEvent>,
    id: ApplicationId,
}

impl ApplicationEventReceiver {
    pub async fn recv(&mut self) -> Result<ApplicationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if event.aggregate_id == self.id {
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
