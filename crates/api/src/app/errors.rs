use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use reftrack_core::DomainError;
use reftrack_infra::EngineError;
use reftrack_infra::store::StoreError;

/// Handlers return the error response directly; both sides implement `IntoResponse`.
pub type HandlerResult = Result<Response, Response>;

pub fn engine_error_to_response(err: EngineError) -> Response {
    match err {
        EngineError::Domain(e) => domain_error_to_response(e),
        EngineError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Inactive { .. } | DomainError::Suspended { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::CrossTenantViolation { .. } => StatusCode::FORBIDDEN,
        DomainError::DuplicateOrder { .. }
        | DomainError::AlreadyDecided { .. }
        | DomainError::AlreadySettled { .. }
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::InsufficientBalance { .. } | DomainError::BelowMinimum { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Unavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        StoreError::Backend(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
        StoreError::Corrupt(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_data", msg)
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_input", message)
}
