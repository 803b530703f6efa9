use axum::{
    Extension, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::middleware::{admin_key_middleware, product_key_middleware};

pub mod admin;
pub mod affiliate;
pub mod products;
pub mod redirect;
pub mod system;
pub mod track;

/// Full routing tree. Capability checks are layered per area.
///
/// Admin creates answer `201`; tracking and ledger operations answer `200`.
pub fn router(services: AppServices) -> Router {
    let keyed_track = Router::new()
        .route("/conversion", post(track::report_conversion))
        .layer(from_fn_with_state(services.clone(), product_key_middleware));

    let track = Router::new()
        .route("/click", post(track::record_click))
        .merge(keyed_track);

    let admin = admin::router()
        .nest("/products", products::router())
        .layer(from_fn_with_state(services.clone(), admin_key_middleware));

    Router::new()
        .route("/", get(system::index))
        .route("/health", get(system::health))
        .route("/go/:slug", get(redirect::follow_referral))
        .nest("/api/v1/track", track)
        .nest("/api/v1/affiliate", affiliate::router())
        .nest("/api/v1/admin", admin)
        .layer(Extension(services))
}
