//! Error types for campused billing.

use crate::ids::IdError;

/// Result type for campused billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in billing operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The balance cannot cover the requested debit.
    #[error("insufficient tokens: remaining={remaining}, required={required}")]
    InsufficientBalance {
        /// Tokens remaining on the balance.
        remaining: i64,
        /// Tokens the operation tried to consume.
        required: i64,
    },

    /// The pricing tier is not one of Batch, Flex, Standard, Priority.
    #[error("invalid tier '{0}': must be one of Batch, Flex, Standard, Priority")]
    UnknownTier(String),

    /// The model has no price under the requested tier.
    #[error("pricing not found for model '{model}' in tier '{tier}'")]
    UnknownModel {
        /// The model identifier.
        model: String,
        /// The tier that was searched.
        tier: String,
    },

    /// A paid order does not reference a plan.
    #[error("order {order_id} has no plan linked")]
    NoPlanLinked {
        /// The order that has no plan.
        order_id: String,
    },

    /// Invalid token amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Input failed domain validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// Human-readable reason.
        message: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl BillingError {
    /// Build a validation error for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
