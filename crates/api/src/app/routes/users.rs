//! User/role assignments.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use risknexus_auth::catalog;
use risknexus_core::{RoleId, UserId};
use risknexus_infra::roles::RoleRepository;

use super::parse_path_id;
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/:user_id/roles", get(user_roles))
        .route("/:user_id/roles/:id", post(assign_role).delete(unassign_role))
}

fn parse_ids(user_id: &str, role_id: &str) -> Result<(UserId, RoleId), axum::response::Response> {
    Ok((parse_path_id(user_id)?, parse_path_id(role_id)?))
}

/// GET /users/:user_id/roles
pub async fn user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::USERS_VIEW).await {
        return resp;
    }
    let user_id: UserId = match parse_path_id(&user_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.roles_for_user(tenant.tenant_id(), user_id).await {
        Ok(roles) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": user_id.to_string(),
                "role_ids": roles.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// POST /users/:user_id/roles/:id
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((user_id, role_id)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::USERS_EDIT).await {
        return resp;
    }
    let (user_id, role_id) = match parse_ids(&user_id, &role_id) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services
        .roles
        .assign_to_user(tenant.tenant_id(), user_id, role_id)
        .await
    {
        Ok(()) => {
            tracing::info!(
                target: "audit",
                action = "user.role.assign",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                user_id = %user_id,
                role_id = %role_id,
                "user.role.assign"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// DELETE /users/:user_id/roles/:id
pub async fn unassign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((user_id, role_id)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::USERS_EDIT).await {
        return resp;
    }
    let (user_id, role_id) = match parse_ids(&user_id, &role_id) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services
        .roles
        .unassign_from_user(tenant.tenant_id(), user_id, role_id)
        .await
    {
        Ok(()) => {
            tracing::info!(
                target: "audit",
                action = "user.role.unassign",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                user_id = %user_id,
                role_id = %role_id,
                "user.role.unassign"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}
