//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and engine construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `cookies.rs`: attribution marker cookies
//! - `errors.rs`: consistent error responses

use axum::Router;
use tower::ServiceBuilder;

use crate::config::ApiConfig;

pub mod cookies;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    Ok(app_with_services(services))
}

/// Router over already-wired services (tests inject an in-memory store here).
pub fn app_with_services(services: services::AppServices) -> Router {
    routes::router(services).layer(ServiceBuilder::new())
}
