//! HTTP request metrics, exposed in Prometheus text format at `/metrics`.
//!
//! Every request is counted by method, route and status, and its latency is
//! observed by method and route. Routes are labelled with their matched
//! pattern (`/api/exam/:exam_id`), never the raw path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ApiError;
use crate::state::AppState;

/// Label used for requests that matched no route.
const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Request counter and latency histogram in a registry owned by the service.
#[derive(Clone)]
pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl HttpMetrics {
    /// Create and register the HTTP metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be registered.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of requests"),
            &["method", "endpoint", "status_code"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Request latency"),
            &["method", "endpoint"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    /// Record one finished request.
    pub fn observe(&self, method: &str, endpoint: &str, status_code: u16, elapsed: Duration) {
        self.requests
            .with_label_values(&[method, endpoint, &status_code.to_string()])
            .inc();
        self.latency
            .with_label_values(&[method, endpoint])
            .observe(elapsed.as_secs_f64());
    }

    /// Everything registered, in text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Count and time one request.
pub async fn track_metrics(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ENDPOINT, MatchedPath::as_str)
        .to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    state.metrics.observe(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        ApiError::Internal(format!("failed to encode metrics: {e}"))
    })?;

    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
