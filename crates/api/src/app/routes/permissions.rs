use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use risknexus_auth::catalog;

use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// GET /permissions - the permission catalog, ordered by module then code.
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&services, &tenant, &principal, &catalog::ROLES_VIEW).await {
        return resp;
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "permissions": catalog::definitions() })),
    )
        .into_response()
}
