use risknexus_auth::Principal;
use risknexus_core::{RoleId, TenantId, UserId};

/// Tenant the request acts within.
///
/// Immutable and present on every authenticated route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated identity taken from the verified token.
///
/// Carries no roles: those are resolved from stored assignments per request,
/// so an unassignment applies to tokens already issued.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    credential_tenant_id: TenantId,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, credential_tenant_id: TenantId) -> Self {
        Self {
            user_id,
            credential_tenant_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn credential_tenant_id(&self) -> TenantId {
        self.credential_tenant_id
    }

    /// Principal holding `roles`, acting within `tenant`.
    pub fn principal(&self, tenant: &TenantContext, roles: Vec<RoleId>) -> Principal {
        Principal {
            user_id: self.user_id,
            active_tenant_id: tenant.tenant_id(),
            tenant_id: self.credential_tenant_id,
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_keeps_credential_tenant() {
        let (home, other) = (TenantId::new(), TenantId::new());
        let ctx = PrincipalContext::new(UserId::new(), home);
        let role = RoleId::new();

        let p = ctx.principal(&TenantContext::new(other), vec![role]);
        assert_eq!(p.tenant_id, home);
        assert_eq!(p.active_tenant_id, other);
        assert_eq!(p.roles, vec![role]);
    }
}
