use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;
use crate::authz::resolve_principal;
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Identity, assigned roles, and effective permissions of the caller.
///
/// `roles` and `permissions` are `null` when the role store cannot be reached.
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let (roles, permissions) = match resolve_principal(&services, &tenant, &principal).await {
        Ok(resolved) => {
            let permissions = services
                .checker
                .effective_permissions(resolved.tenant_id, &resolved.roles)
                .await;
            let roles: Vec<String> = resolved.roles.iter().map(|r| r.to_string()).collect();
            match permissions {
                Ok(set) => (Some(roles), Some(set.codes())),
                Err(e) => {
                    tracing::warn!(error = %e, "could not resolve effective permissions for whoami");
                    (Some(roles), None)
                }
            }
        }
        Err(_) => (None, None),
    };

    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "credential_tenant_id": principal.credential_tenant_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": roles,
        "permissions": permissions,
    }))
}
