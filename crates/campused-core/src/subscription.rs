//! Subscription plans and payment orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{OrderId, PlanId, UserId};

/// Currency every order is charged in.
pub const ORDER_CURRENCY: &str = "INR";

/// A purchasable plan. Buying it grants `token_limit` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID.
    pub id: PlanId,

    /// Display name.
    pub name: String,

    /// Tokens granted on purchase.
    pub token_limit: i64,

    /// Price in paise (1 INR = 100 paise).
    pub price_paise: i64,

    /// Marketing description.
    #[serde(default)]
    pub description: String,

    /// Feature bullet points.
    #[serde(default)]
    pub features: Vec<String>,
}

impl Plan {
    /// Create a plan, validating its amounts.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or a non-positive token
    /// limit or price.
    pub fn new(
        name: impl Into<String>,
        token_limit: i64,
        price_paise: i64,
        description: impl Into<String>,
        features: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BillingError::validation("name", "must not be empty"));
        }
        if token_limit <= 0 {
            return Err(BillingError::validation("token_limit", "must be positive"));
        }
        if price_paise <= 0 {
            return Err(BillingError::validation("price_paise", "must be positive"));
        }

        Ok(Self {
            id: PlanId::generate(),
            name,
            token_limit,
            price_paise,
            description: description.into(),
            features,
        })
    }
}

/// A local payment order mirroring one gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Local order ID.
    pub id: OrderId,

    /// Buyer.
    pub user_id: UserId,

    /// Plan being bought. `None` only for orders whose plan was removed.
    pub plan: Option<Plan>,

    /// Amount in paise.
    pub amount_paise: i64,

    /// ISO currency code.
    pub currency: String,

    /// Gateway order ID (`order_...`).
    pub gateway_order_id: Option<String>,

    /// Gateway payment ID, set when the payment is confirmed.
    pub gateway_payment_id: Option<String>,

    /// Checkout signature, set by direct verification.
    pub gateway_signature: Option<String>,

    /// Whether the payment has been confirmed. Flips false to true once.
    pub is_paid: bool,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the payment was confirmed.
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create an unpaid order for `plan`.
    #[must_use]
    pub fn new(user_id: UserId, plan: Plan, gateway_order_id: impl Into<String>) -> Self {
        Self {
            id: OrderId::generate(),
            user_id,
            amount_paise: plan.price_paise,
            currency: ORDER_CURRENCY.to_string(),
            plan: Some(plan),
            gateway_order_id: Some(gateway_order_id.into()),
            gateway_payment_id: None,
            gateway_signature: None,
            is_paid: false,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    /// Tokens this order grants once paid.
    ///
    /// # Errors
    ///
    /// Returns `NoPlanLinked` if the order has no plan.
    pub fn token_grant(&self) -> Result<i64> {
        self.plan
            .as_ref()
            .map(|plan| plan.token_limit)
            .ok_or_else(|| BillingError::NoPlanLinked {
                order_id: self.id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        Plan::new("Pro", 50_000, 19_900, "For serious aspirants", vec![]).unwrap()
    }

    #[test]
    fn order_copies_plan_price() {
        let order = Order::new(UserId::generate(), plan(), "order_abc");
        assert_eq!(order.amount_paise, 19_900);
        assert_eq!(order.currency, "INR");
        assert!(!order.is_paid);
        assert_eq!(order.token_grant().unwrap(), 50_000);
    }

    #[test]
    fn order_without_plan_has_no_grant() {
        let mut order = Order::new(UserId::generate(), plan(), "order_abc");
        order.plan = None;
        assert!(matches!(
            order.token_grant(),
            Err(BillingError::NoPlanLinked { .. })
        ));
    }

    #[test]
    fn plan_rejects_bad_amounts() {
        assert!(Plan::new("", 1, 1, "", vec![]).is_err());
        assert!(Plan::new("Basic", 0, 100, "", vec![]).is_err());
        assert!(Plan::new("Basic", 100, -1, "", vec![]).is_err());
    }
}
