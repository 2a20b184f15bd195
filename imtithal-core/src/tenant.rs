//! Tenant scoping types.
//!
//! Every engine operation is scoped by an organization and an environment;
//! nothing in the engine ever crosses that boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EnvironmentType;

/// Organization identifier supplied by the surrounding system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationId(Uuid);

impl OrganizationId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The isolation unit for certificates, invoice chains, and submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    org: OrganizationId,
    env: EnvironmentType,
}

impl TenantScope {
    pub fn new(org: OrganizationId, env: EnvironmentType) -> Self {
        Self { org, env }
    }

    pub fn org(&self) -> OrganizationId {
        self.org
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.env.as_str())
    }
}
