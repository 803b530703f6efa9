use std::net::SocketAddr;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use reftrack_attribution::{AttributionMarker, ClickMetadata};
use reftrack_core::AffiliateId;

use crate::app::cookies::read_cookie;
use crate::app::dto::{self, ReportConversionRequest, TrackClickRequest};
use crate::app::errors::{HandlerResult, bad_request, engine_error_to_response};
use crate::app::services::AppServices;
use crate::context::ProductContext;

/// Client-side click beacon.
pub async fn record_click(
    Extension(services): Extension<AppServices>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<TrackClickRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let (Some(slug), Some(code)) = (body.product_slug, body.ref_code) else {
        return Err(bad_request("productSlug and refCode are required"));
    };

    let outcome = services
        .engine
        .record_click(&slug, &code, client_metadata(&headers, connect_info))
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(json!({
        "success": true,
        "clickId": outcome.click.id.to_string(),
        "affiliateId": outcome.affiliate.id.to_string(),
        "productId": outcome.product.id.to_string(),
        "cookieDuration": outcome.product.cookie_duration_days,
    }))
    .into_response())
}

/// Merchant order report, authenticated by the product's `X-API-Key`.
///
/// The affiliate comes from `affiliateId`, else `affiliateCode`, else the
/// `affiliate_id` marker cookie.
pub async fn report_conversion(
    Extension(services): Extension<AppServices>,
    Extension(product): Extension<ProductContext>,
    headers: HeaderMap,
    body: Result<Json<ReportConversionRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let order_id = dto::required(body.order_id, "orderId")?;
    let order_amount = dto::required(body.order_amount, "orderAmount")?;
    let order_amount = dto::amount(order_amount, "orderAmount")?;

    let affiliate_id: AffiliateId = if let Some(raw) = body.affiliate_id.as_deref() {
        dto::parse(raw)?
    } else if let Some(code) = body.affiliate_code.as_deref() {
        services
            .engine
            .find_affiliate_by_code(code)
            .await
            .map_err(engine_error_to_response)?
            .id
    } else if let Some(raw) = read_cookie(&headers, AttributionMarker::AFFILIATE_ID) {
        dto::parse(&raw)?
    } else {
        return Err(bad_request(
            "affiliateId is required (body, affiliateCode or affiliate_id cookie)",
        ));
    };

    let product = product.product();
    let conversion = services
        .engine
        .report_conversion(&product.api_key, affiliate_id, &order_id, order_amount)
        .await
        .map_err(engine_error_to_response)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "conversionId": conversion.id.to_string(),
            "productSlug": product.slug,
            "commissionAmount": conversion.commission_amount,
            "status": conversion.status.as_str(),
        })),
    )
        .into_response())
}

/// Forwarded client address when behind a proxy, else the peer address.
pub fn client_metadata(
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> ClickMetadata {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let ip = forwarded.or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    ClickMetadata::new(ip.as_deref(), user_agent)
}
