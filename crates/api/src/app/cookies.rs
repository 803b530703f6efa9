//! Attribution marker cookies written by the referral redirect and read back on
//! conversion reports that name no affiliate.

use axum::http::{HeaderMap, header};

use reftrack_attribution::AttributionMarker;

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` values for a marker. Readable by client scripts (no `HttpOnly`), which
/// forward the affiliate id on conversion.
pub fn marker_cookies(marker: &AttributionMarker) -> Vec<String> {
    let max_age = marker.max_age_seconds();
    marker
        .entries()
        .into_iter()
        .map(|(name, value)| format!("{name}={value}; Max-Age={max_age}; Path=/; SameSite=Lax"))
        .collect()
}
