//! Role administration.
//!
//! Every write goes through the cached store, so a permission change is
//! visible to the very next authorization check.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use risknexus_auth::{PermissionSet, catalog};
use risknexus_core::RoleId;
use risknexus_infra::roles::{NewRole, RoleRepository, RoleUpdate};

use super::parse_path_id;
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    pub permissions: Vec<String>,
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/:id/permissions", axum::routing::put(set_role_permissions))
        .route(
            "/:id/permissions/:code",
            post(grant_permission).delete(revoke_permission),
        )
        .route("/:id/users", get(role_users))
}

fn permissions_body(role_id: RoleId, set: &PermissionSet) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "role_id": role_id.to_string(),
        "permissions": set.codes(),
    }))
}

/// GET /roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_VIEW).await {
        return resp;
    }

    match services.roles.list(tenant.tenant_id()).await {
        Ok(roles) => (StatusCode::OK, Json(serde_json::json!({ "roles": roles }))).into_response(),
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// POST /roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewRole>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_CREATE).await {
        return resp;
    }

    match services.roles.create(tenant.tenant_id(), body).await {
        Ok(role) => {
            tracing::info!(
                target: "audit",
                action = "role.create",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role.id,
                role_name = %role.name,
                permission_count = role.permissions.len(),
                "role.create"
            );
            (StatusCode::CREATED, Json(role)).into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// GET /roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_VIEW).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.get(tenant.tenant_id(), role_id).await {
        Ok(Some(role)) => (StatusCode::OK, Json(role)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "role not found"),
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// PUT /roles/:id
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<RoleUpdate>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_EDIT).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let permissions_changed = body.permissions.is_some();
    match services.roles.update(tenant.tenant_id(), role_id, body).await {
        Ok(role) => {
            tracing::info!(
                target: "audit",
                action = "role.update",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role.id,
                permissions_changed,
                "role.update"
            );
            (StatusCode::OK, Json(role)).into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// DELETE /roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_DELETE).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.delete(tenant.tenant_id(), role_id).await {
        Ok(()) => {
            tracing::info!(
                target: "audit",
                action = "role.delete",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role_id,
                "role.delete"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// PUT /roles/:id/permissions - replace the role's permission set.
pub async fn set_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<SetPermissionsRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_EDIT).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .roles
        .set_permissions(tenant.tenant_id(), role_id, body.permissions)
        .await
    {
        Ok(set) => {
            tracing::info!(
                target: "audit",
                action = "role.permissions.set",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role_id,
                permission_count = set.len(),
                "role.permissions.set"
            );
            (StatusCode::OK, permissions_body(role_id, &set)).into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// POST /roles/:id/permissions/:code
pub async fn grant_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, code)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_EDIT).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .roles
        .grant_permission(tenant.tenant_id(), role_id, &code)
        .await
    {
        Ok(set) => {
            tracing::info!(
                target: "audit",
                action = "role.permission.grant",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role_id,
                permission = %code,
                "role.permission.grant"
            );
            (StatusCode::OK, permissions_body(role_id, &set)).into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// DELETE /roles/:id/permissions/:code
pub async fn revoke_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, code)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_EDIT).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .roles
        .revoke_permission(tenant.tenant_id(), role_id, &code)
        .await
    {
        Ok(set) => {
            tracing::info!(
                target: "audit",
                action = "role.permission.revoke",
                tenant_id = %tenant.tenant_id(),
                actor = %principal.user_id(),
                role_id = %role_id,
                permission = %code,
                "role.permission.revoke"
            );
            (StatusCode::OK, permissions_body(role_id, &set)).into_response()
        }
        Err(e) => errors::role_store_error_to_response(e),
    }
}

/// GET /roles/:id/users
pub async fn role_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_VIEW).await {
        return resp;
    }
    let role_id: RoleId = match parse_path_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.get(tenant.tenant_id(), role_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "role not found"),
        Err(e) => return errors::role_store_error_to_response(e),
    }

    match services.roles.users_with_role(tenant.tenant_id(), role_id).await {
        Ok(users) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "role_id": role_id.to_string(),
                "user_ids": users.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::role_store_error_to_response(e),
    }
}
