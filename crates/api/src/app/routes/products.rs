use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use serde_json::json;

use reftrack_core::{ProductId, TenantId};
use reftrack_products::{CommissionRule, NewProduct, ProductPatch};

use crate::app::dto::{self, CreateProductRequest, ListQuery, UpdateProductRequest};
use crate::app::errors::{HandlerResult, domain_error_to_response, engine_error_to_response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", patch(update_product))
        .route("/:id/apikey", get(reveal_api_key))
}

pub async fn list_products(
    Extension(services): Extension<AppServices>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let query = dto::parse_query(query)?;
    let tenant_id: Option<TenantId> = query.tenant_id.as_deref().map(dto::parse).transpose()?;
    let paged = services
        .engine
        .list_products(tenant_id, query.page())
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(dto::paged_to_json(&paged, |p| dto::product_to_json(p, false))).into_response())
}

/// The response is the only place besides `/apikey` where the full key is shown.
pub async fn create_product(
    Extension(services): Extension<AppServices>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> HandlerResult {
    let body = dto::parse_body(body)?;
    let name = dto::required(body.name, "name")?;
    let slug = dto::required(body.slug, "slug")?;
    let domain = dto::required(body.domain, "domain")?;
    let kind = dto::required(body.commission_type, "commissionType")?;
    let value = dto::required(body.commission_value, "commissionValue")?;
    let commission = CommissionRule::from_parts(&kind, value).map_err(domain_error_to_response)?;
    let tenant_id: Option<TenantId> = body.tenant_id.as_deref().map(dto::parse).transpose()?;

    let tenant = services
        .engine
        .resolve_tenant(tenant_id)
        .await
        .map_err(engine_error_to_response)?;
    let product = services
        .engine
        .create_product(NewProduct {
            tenant_id: tenant.id,
            name,
            slug,
            domain,
            commission,
            cookie_duration_days: body.cookie_duration,
        })
        .await
        .map_err(engine_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "product": dto::product_to_json(&product, true),
            "_important": "Store the apiKey now; listings only show it masked.",
        })),
    )
        .into_response())
}

/// Partial update. A commission change may name only the type or only the value; the
/// other half is taken from the stored rule.
pub async fn update_product(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> HandlerResult {
    let id: ProductId = dto::parse(&id)?;
    let body = dto::parse_body(body)?;

    let commission = if body.commission_type.is_some() || body.commission_value.is_some() {
        let current = services
            .engine
            .get_product(id)
            .await
            .map_err(engine_error_to_response)?
            .commission;
        let kind = body.commission_type.as_deref().unwrap_or(current.kind());
        let value = body.commission_value.unwrap_or_else(|| current.value());
        Some(CommissionRule::from_parts(kind, value).map_err(domain_error_to_response)?)
    } else {
        None
    };

    let patch = ProductPatch {
        name: body.name,
        slug: body.slug,
        domain: body.domain,
        commission,
        cookie_duration_days: body.cookie_duration,
        active: body.is_active,
    };
    let product = services
        .engine
        .update_product(id, &patch)
        .await
        .map_err(engine_error_to_response)?;

    Ok(Json(json!({ "success": true, "product": dto::product_to_json(&product, false) }))
        .into_response())
}

pub async fn reveal_api_key(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
) -> HandlerResult {
    let id: ProductId = dto::parse(&id)?;
    let product = services
        .engine
        .reveal_api_key(id)
        .await
        .map_err(engine_error_to_response)?;
    Ok(Json(json!({
        "apiKey": product.api_key,
        "slug": product.slug,
        "name": product.name,
    }))
    .into_response())
}
