//! `GET /go/{slug}?ref=CODE`: server-side referral link.
//!
//! Always answers with a redirect. Lookup and tracking failures are logged, never
//! shown to the visitor. `ref` is forwarded to the landing page only when the click was
//! attributed, together with the marker cookies.

use std::net::SocketAddr;

use axum::{
    Extension,
    extract::{ConnectInfo, Path, Query},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use reftrack_affiliates::normalize_code;
use reftrack_attribution::landing_url;

use crate::app::cookies::marker_cookies;
use crate::app::routes::track::client_metadata;
use crate::app::services::AppServices;

#[derive(Debug, Default, Deserialize)]
pub struct ReferralQuery {
    #[serde(rename = "ref")]
    pub ref_code: Option<String>,
}

pub async fn follow_referral(
    Extension(services): Extension<AppServices>,
    Path(slug): Path<String>,
    query: Option<Query<ReferralQuery>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let product = match services.engine.find_product_by_slug(&slug).await {
        Ok(product) if product.is_active() => product,
        Ok(product) => {
            tracing::warn!(slug = %product.slug, "referral link to inactive product");
            return found(&services.fallback_redirect_url, &[]);
        }
        Err(e) => {
            tracing::warn!(slug = %slug, error = %e, "referral link product lookup failed");
            return found(&services.fallback_redirect_url, &[]);
        }
    };

    let raw_ref = query.and_then(|Query(q)| q.ref_code);
    let code = raw_ref.as_deref().and_then(|raw| match normalize_code(raw) {
        Ok(code) => Some(code),
        Err(e) => {
            tracing::warn!(slug = %product.slug, error = %e, "referral link with malformed ref");
            None
        }
    });

    let mut cookies = Vec::new();
    let mut forwarded_ref = None;
    if let Some(code) = &code {
        let metadata = client_metadata(&headers, connect_info);
        // Rejections are already logged by the engine.
        if let Ok(outcome) = services.engine.record_click(&product.slug, code, metadata).await {
            let marker = outcome.marker();
            cookies = marker_cookies(&marker);
            forwarded_ref = Some(marker.ref_code);
        }
    }

    found(&landing_url(&product, forwarded_ref.as_deref()), &cookies)
}

/// `302 Found` with the given `Location` and `Set-Cookie` headers.
fn found(location: &str, cookies: &[String]) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();

    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
        }
        Err(e) => {
            tracing::error!(location, error = %e, "redirect target is not a valid header value");
            headers.insert(header::LOCATION, HeaderValue::from_static("/"));
        }
    }
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
    response
}
