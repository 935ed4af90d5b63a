//! Audience resolution service
//!
//! Expands a communication's declared audience (role tags and/or explicit
//! recipient ids) into the concrete, deduplicated recipient set for one
//! tenant. Output is deterministic for a fixed directory snapshot and is
//! never persisted.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::models::{
    AudienceSpec, RecipientId, RecipientIdentity, ResolvedAudience, TenantId,
};
use crate::{Error, Result};

/// Audience resolver for communication fan-out
#[derive(Clone)]
pub struct AudienceResolver {
    directory: Arc<dyn Directory>,
}

impl std::fmt::Debug for AudienceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudienceResolver").finish()
    }
}

impl AudienceResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Resolve an audience spec into a concrete recipient set
    ///
    /// Role tags expand to the directory's current membership; explicit
    /// recipient ids are looked up individually (unknown ids are skipped
    /// with a warning, not an error). Records whose tenant does not match
    /// the requested tenant are dropped — the resolver fails closed against
    /// a misbehaving directory rather than leaking across tenants.
    ///
    /// An empty spec yields an empty audience; only a directory transport
    /// failure makes this call fail.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        spec: &AudienceSpec,
    ) -> Result<ResolvedAudience> {
        if tenant_id.as_str().is_empty() {
            return Err(Error::InvalidInput(
                "Tenant id cannot be empty".to_string(),
            ));
        }

        // Dedupe by recipient id, first occurrence wins, order preserved
        let mut members: IndexMap<RecipientId, RecipientIdentity> = IndexMap::new();
        let mut mismatched = 0usize;

        for role in &spec.roles {
            let records = self.directory.members_of_role(tenant_id, *role).await?;
            for identity in records {
                Self::admit(tenant_id, identity, &mut members, &mut mismatched);
            }
        }

        for recipient_id in &spec.recipients {
            match self.directory.identity(tenant_id, recipient_id).await? {
                Some(identity) => {
                    Self::admit(tenant_id, identity, &mut members, &mut mismatched);
                }
                None => {
                    warn!(
                        tenant_id = %tenant_id.as_str(),
                        recipient_id = %recipient_id.as_str(),
                        "Explicit recipient not known to directory, skipping"
                    );
                }
            }
        }

        if mismatched > 0 {
            warn!(
                tenant_id = %tenant_id.as_str(),
                dropped = mismatched,
                "Directory returned records for a foreign tenant, dropped"
            );
        }

        debug!(
            tenant_id = %tenant_id.as_str(),
            roles = spec.roles.len(),
            explicit = spec.recipients.len(),
            resolved = members.len(),
            "Audience resolved"
        );

        Ok(ResolvedAudience {
            tenant_id: tenant_id.clone(),
            members: members.into_values().collect(),
        })
    }

    /// Admit a directory record into the audience if its tenant matches
    fn admit(
        tenant_id: &TenantId,
        identity: RecipientIdentity,
        members: &mut IndexMap<RecipientId, RecipientIdentity>,
        mismatched: &mut usize,
    ) {
        if identity.tenant_id != *tenant_id {
            warn!(
                tenant_id = %tenant_id.as_str(),
                record_tenant_id = %identity.tenant_id.as_str(),
                recipient_id = %identity.id.as_str(),
                "Tenant mismatch in directory record"
            );
            *mismatched += 1;
            return;
        }
        members.entry(identity.id.clone()).or_insert(identity);
    }
}
