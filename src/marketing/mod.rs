pub mod auth;
pub mod brevo;
pub mod dispatch;
pub mod token;
pub mod unsubscribe;
pub mod webhook;

use axum::routing::{any, get, post};
use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_marketing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/campaign-send", post(dispatch::send_campaign))
        .route("/campaign-webhook", any(webhook::campaign_webhook))
        .route("/unsubscribe", get(unsubscribe::unsubscribe))
}
