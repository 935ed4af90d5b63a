//! Recipient models
//!
//! Directory-known identities eligible to receive communications, and the
//! concrete audience a communication resolves to.

use serde::{Deserialize, Serialize};

use crate::models::id::{RecipientId, TenantId};

/// Role tag a recipient holds within a tenant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Enrolled student
    Student,
    /// Parent or guardian of a student
    Guardian,
    /// Teaching or administrative staff
    Teacher,
    /// Tenant administrator
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Guardian => write!(f, "guardian"),
            Self::Teacher => write!(f, "teacher"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "guardian" => Ok(Self::Guardian),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            _ => Err(anyhow::anyhow!("Invalid role: {s}")),
        }
    }
}

/// A directory identity with its contact address
///
/// Produced by the Directory; the core treats it as a value type and never
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientIdentity {
    pub id: RecipientId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

/// The concrete, deduplicated recipient set of one communication
///
/// Every member's `tenant_id` equals `tenant_id` — the resolver filters
/// mismatched directory records rather than trusting them. Computed on
/// demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAudience {
    pub tenant_id: TenantId,
    pub members: Vec<RecipientIdentity>,
}

impl ResolvedAudience {
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Contact addresses of all members, in resolution order
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.members.iter().map(|m| m.email.clone()).collect()
    }
}
