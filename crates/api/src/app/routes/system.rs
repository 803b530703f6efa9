use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use crate::app::services::AppServices;

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "reftrack",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "track": "POST /api/v1/track/click, POST /api/v1/track/conversion, GET /go/:slug?ref=CODE",
            "affiliate": "GET /api/v1/affiliate/dashboard, GET /api/v1/affiliate/conversions, POST /api/v1/affiliate/payouts",
            "admin": "GET /api/v1/admin/overview, /api/v1/admin/{tenants,products,affiliates,conversions,payouts}",
        },
    }))
}

/// Liveness plus a round-trip to the store.
pub async fn health(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    match services.engine.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "connected",
                "backend": services.backend,
                "timestamp": Utc::now(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "database": "disconnected",
                    "backend": services.backend,
                    "error": e.to_string(),
                })),
            )
        }
    }
}
