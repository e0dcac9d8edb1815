//! Token metering of model-backed routes.
//!
//! Metering has three steps around the handler:
//!
//! 1. **Admission** - an authenticated caller with no tokens left is rejected
//!    with 402 before the handler runs. Anonymous requests pass through
//!    unmetered and are rejected by the handler's own extractor.
//! 2. **Execution** - the handler records every billable model call in a
//!    [`UsageReport`] and returns it with its result as [`Metered`] or
//!    [`MeteredError`].
//! 3. **Settlement** - the report's total is recorded once, in full. Usage
//!    that has already happened is never refused: it may push `used_tokens`
//!    past `total_tokens`, and `remaining_tokens` then stays at zero until the
//!    next purchase. Settlement never fails the request: errors are logged and
//!    the response goes out with the caller's remaining balance in
//!    [`REMAINING_TOKENS_HEADER`].
//!
//! Admission reads the current balance, it does not reserve. Concurrent
//! requests against a nearly empty balance can each be admitted, so a user
//! can overspend by the requests already in flight when the balance ran out.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use campused_core::{CostBreakdown, PricingTable, ServiceTier, UsageReport, UserId};
use campused_store::CreditLedger;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

/// Response header carrying the caller's post-settlement balance.
pub const REMAINING_TOKENS_HEADER: &str = "x-user-remaining-tokens";

/// Admits, prices and settles metered requests.
#[derive(Clone)]
pub struct UsageGate {
    ledger: CreditLedger,
    pricing: Arc<PricingTable>,
    tier: ServiceTier,
}

/// A request let through admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The caller.
    pub user_id: UserId,
    /// Balance seen at admission.
    pub remaining_tokens: i64,
}

impl UsageGate {
    /// Create a gate pricing usage at `tier`.
    #[must_use]
    pub fn new(ledger: CreditLedger, pricing: Arc<PricingTable>, tier: ServiceTier) -> Self {
        Self {
            ledger,
            pricing,
            tier,
        }
    }

    /// Tier usage is priced at.
    #[must_use]
    pub const fn tier(&self) -> ServiceTier {
        self.tier
    }

    /// Let the request through if the caller has tokens left.
    ///
    /// # Errors
    ///
    /// - `ApiError::InsufficientTokens` if the balance is exhausted.
    /// - `ApiError::Internal` if the balance cannot be read.
    pub async fn admit(&self, user_id: UserId) -> Result<Admission, ApiError> {
        let balance = self.ledger.get_or_create_balance(&user_id).await?;

        if balance.is_exhausted() {
            tracing::info!(
                user_id = %user_id,
                remaining_tokens = balance.remaining_tokens,
                "Request rejected: no tokens remaining"
            );
            return Err(ApiError::InsufficientTokens {
                remaining_tokens: balance.remaining_tokens,
            });
        }

        Ok(Admission {
            user_id,
            remaining_tokens: balance.remaining_tokens,
        })
    }

    /// Price `usage` for the audit trail. Logs and returns `None` if a model
    /// is not priced under the configured tier.
    #[must_use]
    pub fn price(&self, usage: &UsageReport) -> Option<CostBreakdown> {
        match usage.cost(&self.pricing, self.tier) {
            Ok(cost) => cost,
            Err(e) => {
                tracing::error!(error = %e, tier = %self.tier, "Failed to price usage");
                None
            }
        }
    }

    /// Record the usage of an admitted request and return the balance to
    /// report. Never fails.
    pub async fn settle(&self, admission: &Admission, usage: Option<UsageReport>) -> i64 {
        let Some(usage) = usage.filter(|u| u.total_units() > 0) else {
            return admission.remaining_tokens;
        };

        let user_id = &admission.user_id;
        let tokens = usage.total_units();

        if let Some(cost) = self.price(&usage) {
            tracing::debug!(
                user_id = %user_id,
                model = %cost.model,
                input_tokens = cost.input_tokens,
                output_tokens = cost.output_tokens,
                total_cost_usd = cost.total_cost_usd(),
                "Usage priced"
            );
        }

        match self.ledger.settle(user_id, tokens).await {
            Ok(balance) => balance.remaining_tokens,
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    tokens,
                    error = %e,
                    "Settlement failed"
                );
                self.current_remaining(admission).await
            }
        }
    }

    async fn current_remaining(&self, admission: &Admission) -> i64 {
        match self.ledger.get_or_create_balance(&admission.user_id).await {
            Ok(balance) => balance.remaining_tokens,
            Err(_) => admission.remaining_tokens,
        }
    }
}

// ============================================================================
// Handler results
// ============================================================================

/// A successful metered result and the usage it incurred.
#[derive(Debug)]
pub struct Metered<T> {
    /// Business response.
    pub value: T,
    /// Billable usage.
    pub usage: UsageReport,
}

impl<T> Metered<T> {
    /// Pair `value` with `usage`.
    pub fn new(value: T, usage: UsageReport) -> Self {
        Self { value, usage }
    }
}

impl<T: IntoResponse> IntoResponse for Metered<T> {
    fn into_response(self) -> Response {
        let mut response = self.value.into_response();
        response.extensions_mut().insert(self.usage);
        response
    }
}

/// A failed metered request, still carrying the usage billed before it
/// failed.
#[derive(Debug)]
pub struct MeteredError {
    /// What went wrong.
    pub error: ApiError,
    /// Usage incurred before the failure.
    pub usage: UsageReport,
}

impl MeteredError {
    /// Fail with `error` after incurring `usage`.
    pub fn new(error: impl Into<ApiError>, usage: UsageReport) -> Self {
        Self {
            error: error.into(),
            usage,
        }
    }
}

impl From<ApiError> for MeteredError {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            usage: UsageReport::new(),
        }
    }
}

impl IntoResponse for MeteredError {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if !self.usage.is_empty() {
            response.extensions_mut().insert(self.usage);
        }
        response
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Meter one request: admit, run the handler, settle.
pub async fn meter(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(user_id) = authenticate(request.headers(), &state.config) else {
        return next.run(request).await;
    };

    let admission = match state.gate.admit(user_id).await {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    let mut response = next.run(request).await;

    let usage = response.extensions_mut().remove::<UsageReport>();
    let remaining_tokens = state.gate.settle(&admission, usage).await;

    response
        .headers_mut()
        .insert(REMAINING_TOKENS_HEADER, HeaderValue::from(remaining_tokens));
    response
}
