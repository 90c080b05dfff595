// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Allocation pathway routing.
//!
//! Maps a requested allocator type to the approval pathway a request must
//! follow: the root-key-holder multisig or one of the meta-allocator smart
//! contracts. The mapping is total over [`AllocatorType`] and never silently
//! defaults; routing addresses come from a [`PathwayRegistry`] collaborator
//! so the domain stays free of configuration mechanics.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Closed enumeration of allocator types a request may apply under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocatorType {
    /// Market-driven meta-allocator.
    Mdma,
    /// On-ramp meta-allocator.
    Orma,
    /// Direct root-key-holder grant.
    Rkh,
    /// Automated meta-allocator.
    Ama,
}

impl TryFrom<&str> for AllocatorType {
    type Error = AllocationPathError;

    /// Parse the external label. Unknown labels are rejected — never mapped
    /// to a fallback pathway.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "MDMA" => Ok(Self::Mdma),
            "ORMA" | "ODMA" => Ok(Self::Orma),
            "RKH" => Ok(Self::Rkh),
            "AMA" => Ok(Self::Ama),
            other => Err(AllocationPathError::UnknownAllocatorType(
                other.to_string(),
            )),
        }
    }
}

/// Pathway label carried on the resolved route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pathway {
    Mdma,
    Orma,
    Rkh,
    Ama,
}

impl std::fmt::Display for Pathway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Mdma => "MDMA",
            Self::Orma => "ORMA",
            Self::Rkh => "RKH",
            Self::Ama => "AMA",
        };
        write!(f, "{label}")
    }
}

/// Audit classification attached to each pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditType {
    Enterprise,
    OnRamp,
    MarketBased,
    Automated,
}

/// Routing decision for one allocation request. Computed on demand from an
/// [`AllocatorType`]; stateless and never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPath {
    pub pathway: Pathway,
    pub address: String,
    pub audit_type: AuditType,
    pub is_meta_allocator: bool,
}

/// Lookup for pathway routing addresses.
///
/// Kept as a domain trait so the resolver stays pure; the infrastructure
/// implementation is built from deserialized configuration
/// ([`crate::infrastructure::registry::InMemoryPathwayRegistry`]).
pub trait PathwayRegistry: Send + Sync {
    /// The on-chain routing address for `pathway`, if configured.
    fn address_for(&self, pathway: Pathway) -> Option<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationPathError {
    #[error("Unknown allocator type: {0}")]
    UnknownAllocatorType(String),

    #[error("No routing address configured for pathway {0}")]
    AddressNotConfigured(Pathway),
}

/// Pure mapping from allocator type to routing decision.
pub struct AllocationPathResolver {
    registry: Arc<dyn PathwayRegistry>,
}

impl AllocationPathResolver {
    pub fn new(registry: Arc<dyn PathwayRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve the approval pathway for `allocator_type`.
    ///
    /// Total over the enumeration: every variant maps to exactly one
    /// `(pathway, audit_type, is_meta_allocator)` triple.
    ///
    /// # Errors
    ///
    /// [`AllocationPathError::AddressNotConfigured`] if the registry has no
    /// routing address for the resolved pathway.
    pub fn resolve(
        &self,
        allocator_type: AllocatorType,
    ) -> Result<AllocationPath, AllocationPathError> {
        let (pathway, audit_type, is_meta_allocator) = match allocator_type {
            AllocatorType::Mdma => (Pathway::Mdma, AuditType::Enterprise, true),
            AllocatorType::Orma => (Pathway::Orma, AuditType::OnRamp, true),
            AllocatorType::Rkh => (Pathway::Rkh, AuditType::MarketBased, false),
            AllocatorType::Ama => (Pathway::Ama, AuditType::Automated, true),
        };

        let address = self
            .registry
            .address_for(pathway)
            .ok_or(AllocationPathError::AddressNotConfigured(pathway))?;

        Ok(AllocationPath {
            pathway,
            address,
            audit_type,
            is_meta_allocator,
        })
    }
}
