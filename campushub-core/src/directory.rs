//! Directory collaborator
//!
//! The directory is the institution-management backend's source of truth
//! for tenant, user, and role membership. The fan-out core only reads it;
//! a failing directory aborts the whole dispatch rather than producing a
//! partial audience.

use async_trait::async_trait;

use crate::models::{RecipientId, RecipientIdentity, Role, TenantId};
use crate::Result;

/// Resolves tenant/user/role membership
///
/// Implementations signal transport failure with
/// [`Error::DirectoryUnavailable`](crate::Error::DirectoryUnavailable);
/// an unknown recipient is `Ok(None)`, not an error.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Current members of `role` within `tenant_id`
    async fn members_of_role(
        &self,
        tenant_id: &TenantId,
        role: Role,
    ) -> Result<Vec<RecipientIdentity>>;

    /// Look up a single identity within `tenant_id`
    async fn identity(
        &self,
        tenant_id: &TenantId,
        recipient_id: &RecipientId,
    ) -> Result<Option<RecipientIdentity>>;
}
