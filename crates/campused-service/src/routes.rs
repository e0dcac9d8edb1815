//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, channels, credits, exams, health, subscriptions};
use crate::metering::{meter, REMAINING_TOKENS_HEADER};
use crate::metrics::{self, track_metrics};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for model-backed endpoints.
/// Each one holds an upstream model call open for seconds.
const MODEL_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /metrics` - Prometheus metrics
/// - `GET /api/subscriptions/get-subscription-plans` - List plans
///
/// ## Chat (JWT auth, metered)
/// - `POST /api/channel` - Start a channel
/// - `POST /api/channel/:channel_id` - Continue a channel
/// - `GET /api/channel/get-channels` - List channels
/// - `GET /api/channel/:channel_id` - Get a conversation
///
/// ## Exams (JWT auth, metered)
/// - `POST /api/exam/generate` - Generate an exam
/// - `GET /api/exam/get-exams` - List exams
/// - `GET /api/exam/:exam_id` - Get an exam
///
/// ## Credits and subscriptions (JWT auth)
/// - `GET /api/credits/balance` - Get current balance
/// - `POST /api/subscriptions/create-order` - Start a plan purchase
/// - `POST /api/subscriptions/verify-payment` - Confirm a checkout
///
/// ## Admin (admin key)
/// - `POST /api/admin/plans` - Create a plan
///
/// ## Webhooks (Signature verification)
/// - `POST /api/subscriptions/webhook/razorpay` - Razorpay webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Only the POSTs that call a model are metered; reads are free.
    let metered = from_fn_with_state(Arc::clone(&state), meter);

    let model_routes = Router::new()
        .route(
            "/channel",
            post(channels::create_channel).route_layer(metered.clone()),
        )
        .route("/channel/get-channels", get(channels::list_channels))
        .route(
            "/channel/:channel_id",
            get(channels::get_channel)
                .merge(post(channels::continue_channel).route_layer(metered.clone())),
        )
        .route(
            "/exam/generate",
            post(exams::generate_exam).route_layer(metered),
        )
        .route("/exam/get-exams", get(exams::list_exams))
        .route("/exam/:exam_id", get(exams::get_exam))
        .layer(ConcurrencyLimitLayer::new(MODEL_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        // Subscriptions
        .route(
            "/subscriptions/get-subscription-plans",
            get(subscriptions::list_plans),
        )
        .route(
            "/subscriptions/create-order",
            post(subscriptions::create_order),
        )
        .route(
            "/subscriptions/verify-payment",
            post(subscriptions::verify_payment),
        )
        // Admin
        .route("/admin/plans", post(admin::create_plan))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .merge(model_routes)
        // Webhooks (no rate limit - controlled by Razorpay)
        .route(
            "/subscriptions/webhook/razorpay",
            post(subscriptions::razorpay_webhook),
        );

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .nest("/api", api_routes)
        // Global middleware
        .layer(from_fn_with_state(Arc::clone(&state), track_metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
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
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REMAINING_TOKENS_HEADER)]);

    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}
