//! Subscription activation: turning a confirmed payment into tokens.
//!
//! Direct checkout verification and the payment webhook can both confirm
//! the same order. Confirmation goes through [`Store::claim_and_credit`],
//! which flips `is_paid` from false to true for exactly one caller and
//! credits the plan's tokens in the same transaction. A failed credit leaves
//! the order unpaid, so the gateway's retry can still activate it.

use std::sync::Arc;

use campused_core::CreditBalance;
use campused_store::{ClaimedOrder, Store};

use crate::error::ApiError;

/// Credits plan tokens for paid orders.
#[derive(Clone)]
pub struct SubscriptionActivator {
    store: Arc<dyn Store>,
}

impl SubscriptionActivator {
    /// Create an activator.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Confirm a gateway payment and activate its order at most once.
    ///
    /// Returns the new balance when this call performed the activation, and
    /// `None` when the order is unknown, was already confirmed, or has no
    /// plan (logged, nothing credited).
    pub async fn confirm_payment(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Option<CreditBalance>, ApiError> {
        let claimed = self
            .store
            .claim_and_credit(gateway_order_id, payment_id, signature)
            .await
            .map_err(|e| {
                tracing::error!(
                    gateway_order_id = %gateway_order_id,
                    payment_id = %payment_id,
                    error = %e,
                    "Activation failed, order left unpaid"
                );
                ApiError::Internal(format!("activation failed: {e}"))
            })?;

        let Some(ClaimedOrder { order, balance }) = claimed else {
            tracing::info!(
                gateway_order_id = %gateway_order_id,
                payment_id = %payment_id,
                "Payment already confirmed or order unknown, nothing to activate"
            );
            return Ok(None);
        };

        match balance {
            Some(balance) => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    total_tokens = balance.total_tokens,
                    remaining_tokens = balance.remaining_tokens,
                    "Subscription activated"
                );
                Ok(Some(balance))
            }
            None => {
                tracing::error!(
                    order_id = %order.id,
                    gateway_order_id = %gateway_order_id,
                    "Paid order has no plan linked, no tokens credited"
                );
                Ok(None)
            }
        }
    }
}
