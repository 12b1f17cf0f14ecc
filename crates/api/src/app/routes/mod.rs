use std::str::FromStr;

use axum::http::StatusCode;
use axum::{Router, routing::get};

use risknexus_core::DomainError;

use crate::app::errors;

pub mod explain;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod users;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/permissions", get(permissions::list_permissions))
        .nest("/roles", roles::router())
        .nest("/users", users::router())
        .nest("/authz", explain::router())
}

/// Parse an id path segment, answering 400 with the domain message on failure.
pub(crate) fn parse_path_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
