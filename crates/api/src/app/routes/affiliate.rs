//! Affiliate-facing reads and payout requests, keyed by affiliate code.

use axum::{
    Extension, Json, Router,
    extract::{
        Query,
        rejection::{JsonRejection, QueryRejection},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use reftrack_infra::store::Page;

use crate::app::dto::{self, CodeQuery, RequestPayoutRequest};
use crate::app::errors::{HandlerResult, engine_error_to_response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/conversions", get(conversions))
        .route("/payouts", post(request_payout))
}

pub async fn dashboard(
    Extension(services): Extension<AppServices>,
    query: Result<Query<CodeQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let code = dto::required(query.code, "code")?;

    let stats = services
        .engine
        .affiliate_stats(&code)
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(dto::dashboard_to_json(&stats)).into_response())
}

pub async fn conversions(
    Extension(services): Extension<AppServices>,
    query: Result<Query<CodeQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let code = dto::required(query.code, "code")?;

    // Affiliates see their own rows only; the product/affiliate join is dropped.
    let paged = services
        .engine
        .affiliate_conversions(&code, Page::new(query.page, query.limit))
        .await
        .map_err(engine_error_to_response)?
        .map(|view| view.conversion);

    Ok(Json(dto::paged_to_json(&paged, dto::conversion_to_json)).into_response())
}

pub async fn request_payout(
    Extension(services): Extension<AppServices>,
    body: Result<Json<RequestPayoutRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let code = dto::required(body.code, "code")?;
    let amount = dto::amount(dto::required(body.amount, "amount")?, "amount")?;

    let payout = services
        .engine
        .request_payout(&code, amount)
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(json!({
        "success": true,
        "payoutId": payout.id.to_string(),
        "amount": payout.amount,
        "status": payout.status.as_str(),
    }))
    .into_response())
}
