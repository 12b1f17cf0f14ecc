//! Authorization debugging: "why was this request allowed/denied?"

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use risknexus_auth::Permission;

use crate::app::{errors, services::AppServices};
use crate::authz::{authz_error_to_response, resolve_principal};
use crate::context::{PrincipalContext, TenantContext};

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

pub fn router() -> Router {
    Router::new().route("/explain", get(explain_authorization_decision))
}

/// GET /authz/explain?permission=... - explain the caller's own access.
pub async fn explain_authorization_decision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    let code = query.permission.trim();
    if code.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "permission must not be empty",
        );
    }

    let required = Permission::new(code.to_string());
    let resolved = match resolve_principal(&services, &tenant, &principal).await {
        Ok(resolved) => resolved,
        Err(e) => return authz_error_to_response(e),
    };
    match services.checker.explain(&resolved, &required).await {
        Ok(explanation) => (StatusCode::OK, Json(explanation)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "authorization explanation failed");
            authz_error_to_response(e.into())
        }
    }
}
