// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory reconciliation data source.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::domain::repository::{AllocatorRecord, AuditSyncSource, SyncSourceError};

/// [`AuditSyncSource`] over a mutex-held record list. Lookup keys mirror the
/// read-model fields: `"issue_number"` and `"audit_key"`.
#[derive(Clone, Default)]
pub struct InMemoryAuditSyncSource {
    records: Arc<Mutex<Vec<AllocatorRecord>>>,
}

impl InMemoryAuditSyncSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AllocatorRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    fn matches(record: &AllocatorRecord, key: &str, value: &str) -> bool {
        match key {
            "issue_number" => record.issue_number.to_string() == value,
            "audit_key" => record.audit_key == value,
            _ => false,
        }
    }
}

#[async_trait]
impl AuditSyncSource for InMemoryAuditSyncSource {
    async fn find_by(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<AllocatorRecord>, SyncSourceError> {
        let records = self
            .records
            .lock()
            .map_err(|_| SyncSourceError::Backend("Mutex poisoned".to_string()))?;
        Ok(records
            .iter()
            .find(|record| Self::matches(record, key, value))
            .cloned())
    }

    async fn find_with_latest_audit_by(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<AllocatorRecord>, SyncSourceError> {
        let records = self
            .records
            .lock()
            .map_err(|_| SyncSourceError::Backend("Mutex poisoned".to_string()))?;
        Ok(records
            .iter()
            .filter(|record| Self::matches(record, key, value))
            .max_by_key(|record| record.latest_audit().map(|cycle| cycle.started))
            .cloned())
    }
}
