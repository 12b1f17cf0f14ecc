//! Read-side capability for resolving a role's permission codes.

use std::sync::Arc;

use thiserror::Error;

use risknexus_core::{RoleId, TenantId};

use crate::PermissionSet;

/// Failure to establish a role's permissions.
///
/// Callers must treat this as "deny"; an authorization decision is never
/// granted on a failed lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("role store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the permission set of a tenant-scoped role.
///
/// A role that does not exist (or belongs to another tenant) resolves to an
/// empty set, not an error. Implemented by raw repositories and by caching
/// decorators alike, so callers cannot tell which one they hold.
#[async_trait::async_trait]
pub trait RoleLookup: Send + Sync {
    async fn role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, LookupError>;
}

#[async_trait::async_trait]
impl<L> RoleLookup for Arc<L>
where
    L: RoleLookup + ?Sized,
{
    async fn role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, LookupError> {
        (**self).role_permissions(tenant_id, role_id).await
    }
}
