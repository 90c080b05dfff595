// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: in-memory collaborator implementations and the
//! broadcast event bus.

pub mod audit_publisher;
pub mod event_bus;
pub mod event_store;
pub mod registry;
pub mod sync_source;
