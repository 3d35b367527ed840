pub mod normalize;
pub mod pipeline;
pub mod relay;
pub mod spam;

use axum::http::{HeaderValue, Method};
use axum::routing::post;
use axum::Router;
use log::warn;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::shared::state::AppState;

/// Public form endpoint, CORS-restricted to the configured site origins.
pub fn configure_lead_routes(state: &AppState) -> Router<Arc<AppState>> {
    let origins: Vec<HeaderValue> = state
        .config
        .forms
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ]);

    Router::new()
        .route("/form-submit", post(pipeline::submit_form))
        .layer(cors)
}
