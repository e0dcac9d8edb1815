//! Razorpay API client implementation.

use reqwest::Client;
use std::time::Duration;

use super::types::{CreateOrderRequest, RazorpayErrorResponse, RazorpayOrder};
use crate::crypto::{payment_signature_payload, verify_hmac_sha256_hex};

/// Error type for Razorpay operations.
#[derive(Debug, thiserror::Error)]
pub enum RazorpayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Razorpay API returned an error.
    #[error("Razorpay API error: {code} - {description}")]
    Api {
        /// Error code.
        code: String,
        /// Error description.
        description: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid checkout or webhook signature.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Razorpay API client.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: Option<String>,
}

impl RazorpayClient {
    /// Create a new Razorpay client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API URL (e.g., `"https://api.razorpay.com"`)
    /// * `key_id` - Public key ID (`rzp_test_...` or `rzp_live_...`)
    /// * `key_secret` - Key secret, also used to sign checkouts
    /// * `webhook_secret` - Optional webhook signing secret
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret,
        }
    }

    /// Public key ID, handed to the checkout widget.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Whether webhooks can be verified.
    #[must_use]
    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    /// Create an auto-captured order.
    ///
    /// # Arguments
    ///
    /// * `amount_paise` - Amount in paise
    /// * `currency` - ISO currency code
    /// * `receipt` - Our reference (the local order ID)
    pub async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder, RazorpayError> {
        let request = CreateOrderRequest {
            amount: amount_paise,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
            payment_capture: 1,
        };

        tracing::debug!(
            amount_paise,
            currency = %currency,
            receipt = %receipt,
            "Creating Razorpay order"
        );

        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Verify the signature the checkout widget returns for a payment.
    ///
    /// The signature is HMAC-SHA256 of `order_id|payment_id` keyed with the
    /// key secret.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), RazorpayError> {
        let payload = payment_signature_payload(order_id, payment_id);
        if verify_hmac_sha256_hex(&self.key_secret, payload.as_bytes(), signature) {
            Ok(())
        } else {
            Err(RazorpayError::InvalidSignature)
        }
    }

    /// Verify the `X-Razorpay-Signature` of a webhook body.
    pub fn verify_webhook_signature(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<(), RazorpayError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| RazorpayError::Configuration("webhook secret not set".into()))?;

        if verify_hmac_sha256_hex(secret, body, signature) {
            Ok(())
        } else {
            Err(RazorpayError::InvalidSignature)
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RazorpayError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<RazorpayErrorResponse, _> = response.json().await;

        match error_body {
            Ok(razorpay_error) => Err(RazorpayError::Api {
                code: razorpay_error.error.code,
                description: razorpay_error.error.description,
            }),
            Err(_) => Err(RazorpayError::Api {
                code: status.as_u16().to_string(),
                description: format!("HTTP {status}"),
            }),
        }
    }
}
