//! Subscription plan, order and payment handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use campused_core::{Order, OrderId, Plan, PlanId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::razorpay::{RazorpayClient, WebhookEvent};
use crate::state::AppState;

/// Webhook event that confirms a payment.
const PAYMENT_CAPTURED_EVENT: &str = "payment.captured";

/// A plan as listed to clients.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    /// Plan ID.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// Tokens granted on purchase.
    pub token_limit: i64,
    /// Price in paise.
    pub price_paise: i64,
    /// Price in rupees.
    pub price_inr: f64,
    /// Marketing description.
    pub description: String,
    /// Feature bullet points.
    pub features: Vec<String>,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.clone(),
            token_limit: plan.token_limit,
            price_paise: plan.price_paise,
            price_inr: plan.price_paise as f64 / 100.0,
            description: plan.description.clone(),
            features: plan.features.clone(),
        }
    }
}

/// List plans, smallest first. Public.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PlanResponse>>, ApiError> {
    let plans = state.store.list_plans().await?;
    Ok(Json(plans.iter().map(PlanResponse::from).collect()))
}

// ============================================================================
// Orders
// ============================================================================

/// Order creation request.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Plan to buy.
    pub plan_id: PlanId,
}

/// What the checkout widget needs.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    /// Gateway order ID.
    pub order_id: String,
    /// Amount in paise.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Public key ID.
    pub key: String,
    /// Plan name.
    pub plan: String,
}

/// Create a gateway order for a plan and record it locally as unpaid.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let razorpay = razorpay(&state)?;

    let plan = state
        .store
        .get_plan(&request.plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Plan not found".into()))?;

    let local_id = OrderId::generate();
    let gateway_order = razorpay
        .create_order(
            plan.price_paise,
            campused_core::subscription::ORDER_CURRENCY,
            &local_id.to_string(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, plan_id = %plan.id, "Failed to create Razorpay order");
            ApiError::ExternalService("Failed to create payment order".into())
        })?;

    let mut order = Order::new(auth.user_id, plan.clone(), gateway_order.id.clone());
    order.id = local_id;
    state.store.create_order(&order).await?;

    tracing::info!(
        order_id = %order.id,
        gateway_order_id = %gateway_order.id,
        user_id = %auth.user_id,
        plan_id = %plan.id,
        amount_paise = gateway_order.amount,
        "Order created"
    );

    Ok(Json(CreateOrderResponse {
        order_id: gateway_order.id,
        amount: gateway_order.amount,
        currency: gateway_order.currency,
        key: razorpay.key_id().to_string(),
        plan: plan.name,
    }))
}

// ============================================================================
// Payment confirmation
// ============================================================================

/// Checkout callback fields.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    /// Gateway order ID.
    pub razorpay_order_id: String,
    /// Gateway payment ID.
    pub razorpay_payment_id: String,
    /// HMAC of `order_id|payment_id`.
    pub razorpay_signature: String,
}

/// Successful verification.
#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    /// Always `success`.
    pub status: &'static str,
    /// Whether this call credited the plan's tokens.
    pub activated: bool,
    /// Caller's balance after confirmation.
    pub remaining_tokens: i64,
}

/// Verify a checkout signature and activate the order.
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let razorpay = razorpay(&state)?;

    if let Err(e) = razorpay.verify_payment_signature(
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    ) {
        tracing::warn!(
            error = %e,
            gateway_order_id = %request.razorpay_order_id,
            "Payment signature verification failed"
        );
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"status": "failure", "message": "Invalid signature"})),
        )
            .into_response());
    }

    let order = state
        .store
        .get_order_by_gateway_id(&request.razorpay_order_id)
        .await?
        .filter(|order| order.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    let activated = state
        .activator
        .confirm_payment(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            Some(&request.razorpay_signature),
        )
        .await?;

    let remaining_tokens = match &activated {
        Some(balance) => balance.remaining_tokens,
        None => {
            state
                .ledger
                .get_or_create_balance(&order.user_id)
                .await?
                .remaining_tokens
        }
    };

    Ok(Json(VerifyPaymentResponse {
        status: "success",
        activated: activated.is_some(),
        remaining_tokens,
    })
    .into_response())
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Razorpay webhooks.
pub async fn razorpay_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let razorpay = razorpay(&state)?;
    if !razorpay.has_webhook_secret() {
        tracing::warn!("Razorpay webhook received but no webhook secret is configured");
        return Err(ApiError::Unavailable("Webhooks are not configured".into()));
    }

    let signature = headers
        .get("x-razorpay-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Razorpay signature".into()))?;

    razorpay
        .verify_webhook_signature(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid Razorpay webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;

    let event: WebhookEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(event = %event.event, "Received Razorpay webhook");

    if event.event != PAYMENT_CAPTURED_EVENT {
        tracing::debug!(event = %event.event, "Unhandled Razorpay event");
        return Ok(Json(WebhookResponse { received: true }));
    }

    let Some(payment) = event.payload.payment.map(|p| p.entity) else {
        tracing::warn!("payment.captured webhook without a payment entity");
        return Ok(Json(WebhookResponse { received: true }));
    };
    let Some(gateway_order_id) = payment.order_id.as_deref() else {
        tracing::debug!(payment_id = %payment.id, "Captured payment has no order");
        return Ok(Json(WebhookResponse { received: true }));
    };

    state
        .activator
        .confirm_payment(gateway_order_id, &payment.id, None)
        .await?;

    Ok(Json(WebhookResponse { received: true }))
}

fn razorpay(state: &AppState) -> Result<&RazorpayClient, ApiError> {
    state
        .razorpay
        .as_deref()
        .ok_or_else(|| ApiError::Unavailable("Payments are not configured".into()))
}
