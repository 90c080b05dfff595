// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: use-case services over the aggregate and its
//! collaborators.

pub mod refresh_datacap;
pub mod sync_reconciliation;
