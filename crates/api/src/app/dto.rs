use std::str::FromStr;

use axum::Json;
use axum::extract::Query;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::response::Response;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use reftrack_affiliates::Affiliate;
use reftrack_conversions::Conversion;
use reftrack_core::{DomainError, Tenant};
use reftrack_infra::reporting::{AffiliateStats, SystemOverview, format_rate};
use reftrack_infra::store::{AffiliateSummary, ConversionView, Page, Paged, PayoutView};
use reftrack_products::Product;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackClickRequest {
    pub product_slug: Option<String>,
    pub ref_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConversionRequest {
    pub order_id: Option<String>,
    pub order_amount: Option<Decimal>,
    pub affiliate_id: Option<String>,
    pub affiliate_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideConversionRequest {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestPayoutRequest {
    pub code: Option<String>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct TenantRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub domain: Option<String>,
    pub commission_type: Option<String>,
    pub commission_value: Option<Decimal>,
    pub cookie_duration: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub domain: Option<String>,
    pub commission_type: Option<String>,
    pub commission_value: Option<Decimal>,
    pub cookie_duration: Option<u32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAffiliateRequest {
    pub tenant_id: Option<String>,
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AffiliateStatusRequest {
    pub status: Option<String>,
}

/// `?code=&page=&limit=` on affiliate-facing reads.
#[derive(Debug, Default, Deserialize)]
pub struct CodeQuery {
    pub code: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query parameters shared by the admin listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub tenant_id: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

/// Malformed JSON is a 400 like every other input error.
pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|rejection| errors::bad_request(rejection.body_text()))
}

pub fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|Query(v)| v)
        .map_err(|rejection| errors::bad_request(rejection.body_text()))
}

/// Path ids, enum names: anything whose parse failure is a `DomainError`.
pub fn parse<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn required<T>(value: Option<T>, field: &str) -> Result<T, Response> {
    value.ok_or_else(|| errors::bad_request(format!("{field} is required")))
}

/// Whole, non-negative currency units.
pub fn amount(value: Decimal, field: &str) -> Result<i64, Response> {
    if value.is_sign_negative() || !value.fract().is_zero() {
        return Err(errors::bad_request(format!(
            "{field} must be a non-negative whole number"
        )));
    }
    i64::try_from(value).map_err(|_| errors::bad_request(format!("{field} is out of range")))
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn tenant_to_json(tenant: &Tenant) -> Value {
    json!({
        "id": tenant.id.to_string(),
        "name": tenant.name,
        "createdAt": tenant.created_at,
    })
}

/// Listings mask the secret key; only the dedicated reveal endpoint shows it.
pub fn product_to_json(product: &Product, reveal_key: bool) -> Value {
    let api_key = if reveal_key {
        product.api_key.clone()
    } else {
        product.masked_api_key()
    };
    json!({
        "id": product.id.to_string(),
        "tenantId": product.tenant_id.to_string(),
        "name": product.name,
        "slug": product.slug,
        "domain": product.domain,
        "apiKey": api_key,
        "commissionType": product.commission.kind(),
        "commissionValue": product.commission.value(),
        "cookieDuration": product.cookie_duration_days,
        "isActive": product.active,
        "createdAt": product.created_at,
    })
}

pub fn affiliate_to_json(affiliate: &Affiliate) -> Value {
    json!({
        "id": affiliate.id.to_string(),
        "tenantId": affiliate.tenant_id.to_string(),
        "email": affiliate.email,
        "code": affiliate.code,
        "status": affiliate.status.as_str(),
        "balance": affiliate.balance(),
        "createdAt": affiliate.created_at,
    })
}

pub fn affiliate_summary_to_json(row: &AffiliateSummary) -> Value {
    let a = &row.affiliate;
    json!({
        "id": a.id.to_string(),
        "email": a.email,
        "code": a.code,
        "status": a.status.as_str(),
        "balance": a.balance(),
        "totalClicks": row.clicks,
        "totalConversions": row.conversions,
        "totalCommission": row.total_commission,
        "approvedCommission": row.approved_commission,
        "createdAt": a.created_at,
    })
}

pub fn conversion_to_json(conversion: &Conversion) -> Value {
    json!({
        "id": conversion.id.to_string(),
        "orderId": conversion.order_id.as_str(),
        "orderAmount": conversion.order_amount,
        "commissionAmount": conversion.commission_amount,
        "status": conversion.status.as_str(),
        "createdAt": conversion.created_at,
        "decidedAt": conversion.decided_at,
    })
}

/// Admin view: the conversion plus who earned it and for which product.
pub fn conversion_view_to_json(view: &ConversionView) -> Value {
    let mut value = conversion_to_json(&view.conversion);
    value["affiliate"] = json!({
        "id": view.conversion.affiliate_id.to_string(),
        "email": view.affiliate_email,
        "code": view.affiliate_code,
    });
    value["product"] = json!({
        "id": view.conversion.product_id.to_string(),
        "name": view.product_name,
        "slug": view.product_slug,
    });
    value
}

pub fn payout_view_to_json(view: &PayoutView) -> Value {
    let p = &view.payout;
    json!({
        "id": p.id.to_string(),
        "amount": p.amount,
        "status": p.status.as_str(),
        "requestedAt": p.requested_at,
        "processedAt": p.processed_at,
        "affiliate": {
            "id": p.affiliate_id.to_string(),
            "email": view.affiliate_email,
            "code": view.affiliate_code,
        },
    })
}

pub fn paged_to_json<T>(paged: &Paged<T>, item: impl Fn(&T) -> Value) -> Value {
    json!({
        "data": paged.items.iter().map(item).collect::<Vec<_>>(),
        "pagination": {
            "total": paged.total,
            "page": paged.page,
            "limit": paged.limit,
            "totalPages": paged.total_pages(),
        },
    })
}

pub fn dashboard_to_json(stats: &AffiliateStats) -> Value {
    let s = &stats.snapshot;
    json!({
        "affiliate": {
            "id": s.affiliate.id.to_string(),
            "code": s.affiliate.code,
            "email": s.affiliate.email,
            "balance": s.affiliate.balance(),
            "status": s.affiliate.status.as_str(),
            "productSlug": s.referral_product_slug,
        },
        "stats": {
            "totalClicks": s.clicks,
            "totalConversions": s.conversions,
            "conversionRate": format_rate(stats.conversion_rate),
        },
        "commissions": {
            "pending": { "count": s.pending.count, "amount": s.pending.amount },
            "approved": { "count": s.approved.count, "amount": s.approved.amount },
            "totalPaid": s.paid_total,
        },
    })
}

pub fn overview_to_json(overview: &SystemOverview) -> Value {
    let s = &overview.snapshot;
    json!({
        "totalAffiliates": s.active_affiliates,
        "totalClicks": s.clicks,
        "totalConversions": s.conversions,
        "conversionRate": format_rate(overview.conversion_rate),
        "pendingPayouts": {
            "count": s.pending_payouts.count,
            "totalAmount": s.pending_payouts.amount,
        },
        "revenue": {
            "totalOrderAmount": s.approved_order_amount,
            "totalCommissionPaid": s.approved_commission,
        },
    })
}
