// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration-backed pathway registry.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::allocation_path::{Pathway, PathwayRegistry};

/// Routing addresses per pathway, as deserialized from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PathwayRegistryConfig {
    pub mdma_address: String,
    pub orma_address: String,
    pub rkh_address: String,
    pub ama_address: String,
}

/// [`PathwayRegistry`] over a fixed config-derived map.
#[derive(Debug, Clone)]
pub struct InMemoryPathwayRegistry {
    addresses: HashMap<Pathway, String>,
}

impl InMemoryPathwayRegistry {
    pub fn from_config(config: PathwayRegistryConfig) -> Self {
        let mut addresses = HashMap::new();
        addresses.insert(Pathway::Mdma, config.mdma_address);
        addresses.insert(Pathway::Orma, config.orma_address);
        addresses.insert(Pathway::Rkh, config.rkh_address);
        addresses.insert(Pathway::Ama, config.ama_address);
        Self { addresses }
    }
}

impl PathwayRegistry for InMemoryPathwayRegistry {
    fn address_for(&self, pathway: Pathway) -> Option<String> {
        self.addresses.get(&pathway).cloned()
    }
}
