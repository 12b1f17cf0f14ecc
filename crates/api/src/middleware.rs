use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use risknexus_auth::JwtValidator;
use risknexus_core::TenantId;

use crate::app::errors::json_error;
use crate::context::{PrincipalContext, TenantContext};

/// Optional header selecting the tenant a request acts within.
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Verify the bearer token and install tenant/principal context.
///
/// The active tenant defaults to the token's tenant. A differing
/// `X-Tenant-Id` is kept as-is and rejected later by the authorization check.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
    })?;

    let active_tenant = match tenant_override(req.headers()) {
        Some(Ok(tenant_id)) => tenant_id,
        Some(Err(msg)) => return Err(json_error(StatusCode::BAD_REQUEST, "invalid_tenant", msg)),
        None => claims.tenant_id,
    };

    req.extensions_mut().insert(TenantContext::new(active_tenant));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.tenant_id));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn tenant_override(headers: &HeaderMap) -> Option<Result<TenantId, String>> {
    let raw = headers.get(TENANT_HEADER)?;
    Some(
        raw.to_str()
            .map_err(|_| "X-Tenant-Id is not valid ASCII".to_string())
            .and_then(|s| s.trim().parse::<TenantId>().map_err(|e| e.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_requires_scheme_and_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }

    #[test]
    fn tenant_header_is_optional_and_parsed() {
        let mut headers = HeaderMap::new();
        assert!(tenant_override(&headers).is_none());

        headers.insert(TENANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(tenant_override(&headers), Some(Err(_))));

        let tenant = TenantId::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());
        assert_eq!(tenant_override(&headers), Some(Ok(tenant)));
    }
}
