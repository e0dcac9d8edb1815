//! Razorpay API types.

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in the smallest currency unit (paise).
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Our reference for the order.
    pub receipt: String,
    /// Capture payments automatically.
    pub payment_capture: u8,
}

/// A Razorpay order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayOrder {
    /// Order ID (`order_...`).
    pub id: String,
    /// Amount in paise.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Our reference.
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`.
    #[serde(default)]
    pub status: String,
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event name, e.g. `payment.captured`.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: WebhookPayload,
}

/// Webhook payload. Only the payment entity is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// Payment wrapper, present on payment events.
    pub payment: Option<EntityWrapper<PaymentEntity>>,
}

/// `{ "entity": ... }` wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper<T> {
    /// The wrapped entity.
    pub entity: T,
}

/// A payment.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    /// Payment ID (`pay_...`).
    pub id: String,
    /// Order the payment belongs to.
    pub order_id: Option<String>,
    /// Payment status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayErrorResponse {
    /// Error details.
    pub error: RazorpayErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayErrorBody {
    /// Error code, e.g. `BAD_REQUEST_ERROR`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}
