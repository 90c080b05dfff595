// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! DataCap allocation pipeline core.
//!
//! Event-sourced `Application` aggregate tracking a DataCap allocation request
//! through identity verification, governance review, one of two approval
//! pathways (root-key-holder multisig or on-chain meta-allocator), and the
//! recurring refresh/audit cycle that follows allocation.
//!
//! # Architecture
//!
//! - **Layer: domain** — the aggregate, its events, the pure pathway and
//!   audit-outcome resolvers, and collaborator contracts.
//! - **Layer: application** — use-case services orchestrating the aggregate
//!   (refresh workflow, external-sync reconciliation).
//! - **Layer: infrastructure** — in-memory collaborator implementations and
//!   the broadcast event bus.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
