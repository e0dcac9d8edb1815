//! Per-user token balance.
//!
//! A balance is only ever changed through [`CreditBalance::apply_debit`],
//! [`CreditBalance::apply_usage`] and [`CreditBalance::apply_credit`]; all of
//! them keep `remaining_tokens` equal to `max(total_tokens - used_tokens, 0)`.
//! Stores call them while holding the row lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::UserId;

/// Token balance of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Owner of the balance.
    pub user_id: UserId,

    /// Tokens granted over the lifetime of the account. Never decreases.
    pub total_tokens: i64,

    /// Tokens consumed over the lifetime of the account. Never decreases.
    pub used_tokens: i64,

    /// Stored copy of `max(total_tokens - used_tokens, 0)`.
    pub remaining_tokens: i64,

    /// When the balance last changed.
    pub last_updated: DateTime<Utc>,
}

impl CreditBalance {
    /// Create an all-zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_tokens: 0,
            used_tokens: 0,
            remaining_tokens: 0,
            last_updated: Utc::now(),
        }
    }

    /// `max(total_tokens - used_tokens, 0)`.
    #[must_use]
    pub fn derived_remaining(&self) -> i64 {
        (self.total_tokens - self.used_tokens).max(0)
    }

    /// Whether the stored remainder matches the derived one.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total_tokens >= 0
            && self.used_tokens >= 0
            && self.remaining_tokens == self.derived_remaining()
    }

    /// Whether admission should be refused.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining_tokens <= 0
    }

    /// Consume `tokens`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a non-positive amount and
    /// `InsufficientBalance` when `tokens` exceeds the remainder. On error the
    /// balance is left untouched.
    pub fn apply_debit(&mut self, tokens: i64) -> Result<()> {
        if tokens <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "debit must be positive, got {tokens}"
            )));
        }
        if self.remaining_tokens < tokens {
            return Err(BillingError::InsufficientBalance {
                remaining: self.remaining_tokens,
                required: tokens,
            });
        }

        self.used_tokens += tokens;
        self.remaining_tokens = self.derived_remaining();
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Record `tokens` of settled usage, even past the remainder.
    ///
    /// `used_tokens` may end above `total_tokens`; `remaining_tokens` is then
    /// clamped at zero and the next admission is refused.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a non-positive amount or one that would
    /// overflow `used_tokens`.
    pub fn apply_usage(&mut self, tokens: i64) -> Result<()> {
        if tokens <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "usage must be positive, got {tokens}"
            )));
        }
        let used_tokens = self.used_tokens.checked_add(tokens).ok_or_else(|| {
            BillingError::InvalidAmount(format!(
                "usage of {tokens} overflows used_tokens {}",
                self.used_tokens
            ))
        })?;

        self.used_tokens = used_tokens;
        self.remaining_tokens = self.derived_remaining();
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Grant `tokens`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a non-positive amount or one that would
    /// overflow `total_tokens`. On error the balance is left untouched.
    pub fn apply_credit(&mut self, tokens: i64) -> Result<()> {
        if tokens <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "credit must be positive, got {tokens}"
            )));
        }
        let total_tokens = self.total_tokens.checked_add(tokens).ok_or_else(|| {
            BillingError::InvalidAmount(format!(
                "credit of {tokens} overflows total_tokens {}",
                self.total_tokens
            ))
        })?;

        self.total_tokens = total_tokens;
        self.remaining_tokens = self.derived_remaining();
        self.last_updated = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_balance_is_exhausted() {
        let balance = CreditBalance::new(UserId::generate());
        assert!(balance.is_exhausted());
        assert!(balance.is_consistent());
    }

    #[test]
    fn invariant_holds_across_operations() {
        let mut balance = CreditBalance::new(UserId::generate());

        balance.apply_credit(1_000).unwrap();
        assert!(balance.is_consistent());
        balance.apply_debit(300).unwrap();
        assert!(balance.is_consistent());
        balance.apply_credit(500).unwrap();
        assert!(balance.is_consistent());
        balance.apply_debit(1_200).unwrap();
        assert!(balance.is_consistent());

        assert_eq!(balance.total_tokens, 1_500);
        assert_eq!(balance.used_tokens, 1_500);
        assert_eq!(balance.remaining_tokens, 0);
        assert!(balance.is_exhausted());
    }

    #[test]
    fn over_debit_leaves_balance_unchanged() {
        let mut balance = CreditBalance::new(UserId::generate());
        balance.apply_credit(100).unwrap();
        let before = balance.clone();

        let err = balance.apply_debit(101).unwrap_err();

        assert!(matches!(
            err,
            BillingError::InsufficientBalance {
                remaining: 100,
                required: 101
            }
        ));
        assert_eq!(balance, before);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut balance = CreditBalance::new(UserId::generate());
        assert!(matches!(
            balance.apply_credit(0),
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            balance.apply_debit(-5),
            Err(BillingError::InvalidAmount(_))
        ));
        assert_eq!(balance.total_tokens, 0);
    }

    #[test]
    fn usage_past_the_remainder_clamps_at_zero() {
        let mut balance = CreditBalance::new(UserId::generate());
        balance.apply_credit(10).unwrap();

        balance.apply_usage(300).unwrap();

        assert_eq!(balance.used_tokens, 300);
        assert_eq!(balance.remaining_tokens, 0);
        assert!(balance.is_consistent());
        assert!(balance.is_exhausted());

        // A later grant first covers the overspend
        balance.apply_credit(500).unwrap();
        assert_eq!(balance.remaining_tokens, 210);
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let mut balance = CreditBalance::new(UserId::generate());
        balance.apply_credit(i64::MAX - 5).unwrap();
        let before = balance.clone();

        assert!(matches!(
            balance.apply_credit(10),
            Err(BillingError::InvalidAmount(_))
        ));
        assert_eq!(balance, before);
        assert!(matches!(
            balance.apply_usage(0),
            Err(BillingError::InvalidAmount(_))
        ));
    }

    #[test]
    fn stale_remainder_is_detected() {
        let mut balance = CreditBalance::new(UserId::generate());
        balance.apply_credit(10).unwrap();
        balance.remaining_tokens = 3;
        assert!(!balance.is_consistent());
    }
}
