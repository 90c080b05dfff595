// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: the `Application` aggregate and its collaborators.

pub mod allocation_path;
pub mod application;
pub mod audit;
pub mod event_sourcing;
pub mod events;
pub mod repository;
