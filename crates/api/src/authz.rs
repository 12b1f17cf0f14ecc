//! Per-handler authorization guard.
//!
//! Handlers call [`require`] first thing; anything but an explicit grant
//! becomes an error response.

use axum::http::StatusCode;
use axum::response::Response;

use risknexus_auth::{AuthzError, Permission, Principal};
use risknexus_infra::roles::RoleRepository;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Resolve the caller's roles from stored assignments in the credential's
/// tenant. A store failure is an authorization failure.
pub async fn resolve_principal(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Result<Principal, AuthzError> {
    let roles = services
        .roles
        .roles_for_user(principal.credential_tenant_id(), principal.user_id())
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %principal.user_id(), error = %e, "role assignments unavailable; denying");
            AuthzError::Unavailable(e.to_string())
        })?;
    Ok(principal.principal(tenant, roles))
}

pub async fn require(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), Response> {
    let outcome = match resolve_principal(services, tenant, principal).await {
        Ok(resolved) => services.checker.authorize(&resolved, permission).await,
        Err(e) => Err(e),
    };
    outcome.map_err(|e| {
        tracing::debug!(
            user_id = %principal.user_id(),
            tenant_id = %tenant.tenant_id(),
            permission = %permission,
            error = %e,
            "request denied"
        );
        authz_error_to_response(e)
    })
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    match err {
        AuthzError::TenantMismatch => json_error(
            StatusCode::FORBIDDEN,
            "tenant_mismatch",
            "token was not issued for the requested tenant",
        ),
        AuthzError::Forbidden(code) => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("missing permission '{code}'"),
        ),
        AuthzError::Unavailable(_) => json_error(
            StatusCode::FORBIDDEN,
            "authorization_unavailable",
            "permissions could not be established",
        ),
    }
}
