//! Error types for campused storage.

use campused_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },

    /// The balance cannot cover a debit.
    #[error("insufficient tokens: remaining={remaining}, required={required}")]
    InsufficientBalance {
        /// Tokens remaining.
        remaining: i64,
        /// Tokens requested.
        required: i64,
    },

    /// A debit or credit amount was not positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The write conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<BillingError> for StoreError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientBalance {
                remaining,
                required,
            } => Self::InsufficientBalance {
                remaining,
                required,
            },
            BillingError::InvalidAmount(message) => Self::InvalidAmount(message),
            other => Self::Conflict(other.to_string()),
        }
    }
}
