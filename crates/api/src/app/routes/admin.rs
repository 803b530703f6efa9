//! Admin surface (behind `X-Admin-Key`): tenants, affiliates, conversion decisions,
//! payouts and system reporting. Products live in `products.rs`.

use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, put},
};
use serde_json::json;

use reftrack_affiliates::{AffiliateStatus, NewAffiliate};
use reftrack_conversions::{ConversionStatus, Decision};
use reftrack_core::{AffiliateId, ConversionId, PayoutId, TenantId};
use reftrack_infra::store::{AffiliateFilter, ConversionFilter, PayoutFilter};
use reftrack_ledger::PayoutStatus;

use crate::app::dto::{
    self, AffiliateStatusRequest, CreateAffiliateRequest, DecideConversionRequest, ListQuery,
    TenantRequest,
};
use crate::app::errors::{HandlerResult, engine_error_to_response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/overview", get(overview))
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route("/tenants/:id", patch(rename_tenant))
        .route("/affiliates", get(list_affiliates).post(create_affiliate))
        .route("/affiliates/:id/status", patch(set_affiliate_status))
        .route("/affiliates/:id/balance-audit", get(balance_audit))
        .route("/conversions", get(list_conversions))
        .route("/conversions/:id", put(decide_conversion))
        .route("/payouts", get(list_payouts))
        .route("/payouts/:id", put(settle_payout))
}

// -- reporting --

pub async fn overview(Extension(services): Extension<AppServices>) -> HandlerResult {
    let overview = services
        .engine
        .overview()
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::overview_to_json(&overview)).into_response())
}

// -- tenants --

pub async fn list_tenants(
    Extension(services): Extension<AppServices>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let paged = services
        .engine
        .list_tenants(query.page())
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::paged_to_json(&paged, dto::tenant_to_json)).into_response())
}

pub async fn create_tenant(
    Extension(services): Extension<AppServices>,
    body: Result<Json<TenantRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let name = dto::required(body.name, "name")?;
    let tenant = services
        .engine
        .create_tenant(&name)
        .await
        .map_err(engine_error_to_response)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "tenant": dto::tenant_to_json(&tenant) })),
    )
        .into_response())
}

pub async fn rename_tenant(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
    body: Result<Json<TenantRequest>, JsonRejection>,
) -> HandlerResult {
    let id: TenantId = dto::parse(&id)?;
    let body = dto::parse_body(body)?;
    let name = dto::required(body.name, "name")?;
    let tenant = services
        .engine
        .rename_tenant(id, &name)
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(json!({ "success": true, "tenant": dto::tenant_to_json(&tenant) })).into_response())
}

// -- affiliates --

pub async fn list_affiliates(
    Extension(services): Extension<AppServices>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let filter = AffiliateFilter {
        tenant_id: query.tenant_id.as_deref().map(dto::parse).transpose()?,
        search: query.search.clone().filter(|s| !s.trim().is_empty()),
    };
    let paged = services
        .engine
        .list_affiliates(&filter, query.page())
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::paged_to_json(&paged, dto::affiliate_summary_to_json)).into_response())
}

/// Without `tenantId` the affiliate joins the oldest tenant.
pub async fn create_affiliate(
    Extension(services): Extension<AppServices>,
    body: Result<Json<CreateAffiliateRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let email = dto::required(body.email, "email")?;
    let code = dto::required(body.code, "code")?;
    let tenant_id: Option<TenantId> = body.tenant_id.as_deref().map(dto::parse).transpose()?;

    let tenant = services
        .engine
        .resolve_tenant(tenant_id)
        .await
        .map_err(engine_error_to_response)?;
    let affiliate = services
        .engine
        .register_affiliate(NewAffiliate {
            tenant_id: tenant.id,
            code,
            email,
        })
        .await
        .map_err(engine_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "affiliate": dto::affiliate_to_json(&affiliate) })),
    )
        .into_response())
}

pub async fn set_affiliate_status(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
    body: Result<Json<AffiliateStatusRequest>, JsonRejection>,
) -> HandlerResult {
    let id: AffiliateId = dto::parse(&id)?;
    let body = dto::parse_body(body)?;
    let status: AffiliateStatus = dto::parse(&dto::required(body.status, "status")?)?;

    let affiliate = services
        .engine
        .set_affiliate_status(id, status)
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(json!({
        "success": true,
        "id": affiliate.id.to_string(),
        "status": affiliate.status.as_str(),
    }))
    .into_response())
}

pub async fn balance_audit(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
) -> HandlerResult {
    let id: AffiliateId = dto::parse(&id)?;
    let audit = services
        .engine
        .audit_balance(id)
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(audit).into_response())
}

// -- conversions --

pub async fn list_conversions(
    Extension(services): Extension<AppServices>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let status: Option<ConversionStatus> = query.status.as_deref().map(dto::parse).transpose()?;
    let filter = ConversionFilter {
        affiliate_id: None,
        status,
    };
    let paged = services
        .engine
        .list_conversions(&filter, query.page())
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::paged_to_json(&paged, dto::conversion_view_to_json)).into_response())
}

pub async fn decide_conversion(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
    body: Result<Json<DecideConversionRequest>, JsonRejection>,
) -> HandlerResult {
    let id: ConversionId = dto::parse(&id)?;
    let body = dto::parse_body(body)?;
    let decision: Decision = dto::parse(&dto::required(body.action, "action")?)?;

    let conversion = services
        .engine
        .decide_conversion(id, decision)
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(json!({
        "success": true,
        "conversionId": conversion.id.to_string(),
        "status": conversion.status.as_str(),
    }))
    .into_response())
}

// -- payouts --

pub async fn list_payouts(
    Extension(services): Extension<AppServices>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let status: Option<PayoutStatus> = query.status.as_deref().map(dto::parse).transpose()?;
    let filter = PayoutFilter {
        affiliate_id: None,
        status,
    };
    let paged = services
        .engine
        .list_payouts(&filter, query.page())
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::paged_to_json(&paged, dto::payout_view_to_json)).into_response())
}

pub async fn settle_payout(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
) -> HandlerResult {
    let id: PayoutId = dto::parse(&id)?;
    let payout = services
        .engine
        .settle_payout(id)
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "payoutId": payout.id.to_string(),
        "status": payout.status.as_str(),
    }))
    .into_response())
}
