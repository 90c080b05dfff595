// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory event store.
//!
//! One append-only stream per aggregate id, held under a mutex. Used for
//! development and testing; a persistent store plugs in behind the same
//! [`ApplicationEventStore`] contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::application::{Application, ApplicationId};
use crate::domain::event_sourcing::EventSourced;
use crate::domain::events::ApplicationEvent;
use crate::domain::repository::{ApplicationEventStore, EventStoreError, ExpectedVersion};

#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<Mutex<HashMap<Uuid, Vec<ApplicationEvent>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events persisted for `id`.
    pub fn stream_len(&self, id: ApplicationId) -> usize {
        self.streams
            .lock()
            .map(|streams| streams.get(&id.as_uuid()).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ApplicationEventStore for InMemoryEventStore {
    async fn load(&self, id: ApplicationId) -> Result<Vec<ApplicationEvent>, EventStoreError> {
        let streams = self
            .streams
            .lock()
            .map_err(|_| EventStoreError::Storage("Mutex poisoned".to_string()))?;
        Ok(streams.get(&id.as_uuid()).cloned().unwrap_or_default())
    }

    async fn save(
        &self,
        application: &mut Application,
        expected: ExpectedVersion,
    ) -> Result<Vec<ApplicationEvent>, EventStoreError> {
        let mut streams = self
            .streams
            .lock()
            .map_err(|_| EventStoreError::Storage("Mutex poisoned".to_string()))?;
        let stream = streams.entry(application.id.as_uuid()).or_default();

        if let ExpectedVersion::Exact(expected) = expected {
            let stored = stream.len() as u64;
            if stored != expected {
                return Err(EventStoreError::VersionConflict {
                    aggregate_id: application.id,
                    expected,
                    stored,
                });
            }
        }

        let pending = application.take_pending();
        stream.extend(pending.iter().cloned());
        Ok(pending)
    }
}
