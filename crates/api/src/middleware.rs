use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use reftrack_core::DomainError;
use reftrack_infra::EngineError;

use crate::app::errors::{engine_error_to_response, json_error};
use crate::app::services::AppServices;
use crate::context::{AdminContext, ProductContext};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Admin capability: missing key → 401, wrong key → 403.
pub async fn admin_key_middleware(
    State(services): State<AppServices>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let key = extract_key(req.headers(), ADMIN_KEY_HEADER)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing admin key"))?;

    if !constant_time_eq(key.as_bytes(), services.admin_api_key.as_bytes()) {
        return Err(json_error(StatusCode::FORBIDDEN, "forbidden", "invalid admin key"));
    }

    req.extensions_mut().insert(AdminContext);
    Ok(next.run(req).await)
}

/// Product capability: missing key → 401, unknown or inactive product → 403.
pub async fn product_key_middleware(
    State(services): State<AppServices>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let key = extract_key(req.headers(), API_KEY_HEADER)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing api key"))?
        .to_string();

    let product = match services.engine.authenticate_product(&key).await {
        Ok(product) => product,
        Err(EngineError::Domain(DomainError::NotFound { .. })) => {
            return Err(json_error(StatusCode::FORBIDDEN, "forbidden", "invalid api key"));
        }
        Err(EngineError::Domain(DomainError::Inactive { .. })) => {
            return Err(json_error(StatusCode::FORBIDDEN, "forbidden", "product is inactive"));
        }
        Err(e) => return Err(engine_error_to_response(e)),
    };

    req.extensions_mut().insert(ProductContext::new(product));
    Ok(next.run(req).await)
}

fn extract_key<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let key = headers.get(name)?.to_str().ok()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(key)
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }

    #[test]
    fn blank_keys_count_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(extract_key(&headers, API_KEY_HEADER), None);
        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" sk_app_1 "));
        assert_eq!(extract_key(&headers, API_KEY_HEADER), Some("sk_app_1"));
    }
}
