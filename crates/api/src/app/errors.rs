use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use risknexus_infra::roles::RoleStoreError;

pub fn role_store_error_to_response(err: RoleStoreError) -> axum::response::Response {
    match err {
        RoleStoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "role not found"),
        RoleStoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        RoleStoreError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        RoleStoreError::InUse(holders) => json_error(
            StatusCode::CONFLICT,
            "role_in_use",
            format!("role is assigned to {holders} user(s)"),
        ),
        RoleStoreError::Storage(msg) => {
            tracing::error!(error = %msg, "role store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "role store unavailable")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
