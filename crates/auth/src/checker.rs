//! Permission checks over a role lookup.

use risknexus_core::{RoleId, TenantId};

use crate::authorize::{AuthorizationExplanation, explain_authorization, ensure_tenant};
use crate::{AuthzError, LookupError, Permission, PermissionSet, Principal, RoleLookup};

/// Decides whether a set of roles grants a permission.
///
/// Pure decision logic over whatever `RoleLookup` it is given; hand it a
/// caching decorator to avoid a storage round-trip per request.
#[derive(Debug, Clone)]
pub struct PermissionChecker<L> {
    lookup: L,
}

impl<L> PermissionChecker<L>
where
    L: RoleLookup,
{
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Whether any of `roles` grants `required` within `tenant_id`.
    ///
    /// Roles are consulted in order and the search stops at the first grant.
    /// A lookup failure is returned as-is; callers must deny on `Err`.
    #[tracing::instrument(level = "debug", skip(self, roles), fields(roles = roles.len()))]
    pub async fn has_permission(
        &self,
        tenant_id: TenantId,
        roles: &[RoleId],
        required: &Permission,
    ) -> Result<bool, LookupError> {
        for role_id in roles {
            let set = self.lookup.role_permissions(tenant_id, *role_id).await?;
            if set.grants(required) {
                tracing::debug!(%role_id, permission = %required, "permission granted");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Union of the permission sets of all `roles`.
    pub async fn effective_permissions(
        &self,
        tenant_id: TenantId,
        roles: &[RoleId],
    ) -> Result<PermissionSet, LookupError> {
        let mut effective = PermissionSet::empty();
        for role_id in roles {
            let set = self.lookup.role_permissions(tenant_id, *role_id).await?;
            effective = effective.union(&set);
        }
        Ok(effective)
    }

    /// Authorize a principal for `required`, denying by default.
    ///
    /// Roles are always resolved under the credential's tenant.
    pub async fn authorize(
        &self,
        principal: &Principal,
        required: &Permission,
    ) -> Result<(), AuthzError> {
        ensure_tenant(principal)?;

        match self
            .has_permission(principal.tenant_id, &principal.roles, required)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthzError::Forbidden(required.as_str().to_string())),
            Err(e) => {
                tracing::warn!(error = %e, permission = %required, "permission lookup failed; denying");
                Err(e.into())
            }
        }
    }

    /// Resolve every role of `principal` and explain the decision for `required`.
    pub async fn explain(
        &self,
        principal: &Principal,
        required: &Permission,
    ) -> Result<AuthorizationExplanation, LookupError> {
        let mut role_sets = Vec::with_capacity(principal.roles.len());
        for role_id in &principal.roles {
            let set = self
                .lookup
                .role_permissions(principal.tenant_id, *role_id)
                .await?;
            role_sets.push((*role_id, set));
        }
        Ok(explain_authorization(principal, required, &role_sets))
    }
}
