//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, realtime, subscriptions, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Subscriptions (bearer auth)
/// - `POST /v1/subscriptions/create-payment` - Activate a free plan or start a paid checkout
/// - `POST /v1/subscriptions/verify-payment` - Confirm a client-side payment
/// - `GET /v1/subscriptions/current` - Current subscription
/// - `GET /v1/subscriptions/history` - Recent subscriptions
/// - `GET /v1/subscriptions/transactions` - Ledger with summary
/// - `PATCH /v1/subscriptions/auto-renew` - Auto-renew settings
/// - `POST /v1/subscriptions/cancel` - Cancel the active subscription
/// - `GET /v1/subscriptions/events` - WebSocket event stream
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let subscription_routes = Router::new()
        .route("/create-payment", post(subscriptions::create_payment))
        .route("/verify-payment", post(subscriptions::verify_payment))
        .route("/current", get(subscriptions::current))
        .route("/history", get(subscriptions::history))
        .route("/transactions", get(subscriptions::transactions))
        .route("/auto-renew", patch(subscriptions::update_auto_renew))
        .route("/cancel", post(subscriptions::cancel))
        .route("/events", get(realtime::events));

    let api_routes = Router::new()
        .nest("/subscriptions", subscription_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks are not rate limited; the processor controls delivery.
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(origins)
    }
}
