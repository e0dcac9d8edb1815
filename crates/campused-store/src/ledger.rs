//! The credit ledger: sole mutator of user balances.

use std::sync::Arc;

use campused_core::{BillingError, CreditBalance, Result, UserId};

use crate::{Store, StoreError};

/// Debits and credits token balances through a [`Store`].
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
}

impl CreditLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The user's balance, created all-zero if absent. Not locked.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Storage` if the store fails.
    pub async fn get_or_create_balance(&self, user_id: &UserId) -> Result<CreditBalance> {
        self.store
            .get_or_create_balance(user_id)
            .await
            .map_err(billing_error)
    }

    /// Consume `tokens` from the user's balance.
    ///
    /// # Errors
    ///
    /// - `BillingError::InsufficientBalance` if fewer than `tokens` remain.
    /// - `BillingError::InvalidAmount` if `tokens` is zero or does not fit.
    /// - `BillingError::Storage` if the store fails.
    pub async fn debit(&self, user_id: &UserId, tokens: u64) -> Result<CreditBalance> {
        let tokens = positive_amount(tokens)?;

        let balance = self
            .store
            .debit_tokens(user_id, tokens)
            .await
            .map_err(billing_error)?;

        tracing::debug!(
            user_id = %user_id,
            tokens,
            remaining_tokens = balance.remaining_tokens,
            "Tokens debited"
        );
        Ok(balance)
    }

    /// Record `tokens` of usage that has already happened.
    ///
    /// Unlike [`CreditLedger::debit`] this is never refused for lack of
    /// balance: the full amount is added to `used_tokens` and
    /// `remaining_tokens` bottoms out at zero.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidAmount` if `tokens` is zero or does not fit.
    /// - `BillingError::Storage` if the store fails.
    pub async fn settle(&self, user_id: &UserId, tokens: u64) -> Result<CreditBalance> {
        let tokens = positive_amount(tokens)?;

        let balance = self
            .store
            .consume_tokens(user_id, tokens)
            .await
            .map_err(billing_error)?;

        if balance.used_tokens > balance.total_tokens {
            tracing::info!(
                user_id = %user_id,
                tokens,
                overspent = balance.used_tokens - balance.total_tokens,
                "Usage settled past the remaining balance"
            );
        } else {
            tracing::debug!(
                user_id = %user_id,
                tokens,
                remaining_tokens = balance.remaining_tokens,
                "Usage settled"
            );
        }
        Ok(balance)
    }

    /// Grant `tokens` to the user's balance.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidAmount` if `tokens` is not positive.
    /// - `BillingError::Storage` if the store fails.
    pub async fn credit(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        if tokens <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "credit must be positive, got {tokens}"
            )));
        }

        let balance = self
            .store
            .credit_tokens(user_id, tokens)
            .await
            .map_err(billing_error)?;

        tracing::info!(
            user_id = %user_id,
            tokens,
            total_tokens = balance.total_tokens,
            remaining_tokens = balance.remaining_tokens,
            "Tokens credited"
        );
        Ok(balance)
    }
}

fn positive_amount(tokens: u64) -> Result<i64> {
    match i64::try_from(tokens) {
        Ok(tokens) if tokens > 0 => Ok(tokens),
        _ => Err(BillingError::InvalidAmount(format!(
            "amount must be between 1 and {}, got {tokens}",
            i64::MAX
        ))),
    }
}

fn billing_error(err: StoreError) -> BillingError {
    match err {
        StoreError::InsufficientBalance {
            remaining,
            required,
        } => BillingError::InsufficientBalance {
            remaining,
            required,
        },
        StoreError::InvalidAmount(message) => BillingError::InvalidAmount(message),
        other => BillingError::Storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn ledger() -> CreditLedger {
        CreditLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn credit_then_debit() {
        let ledger = ledger();
        let user_id = UserId::generate();

        let credited = ledger.credit(&user_id, 500).await.unwrap();
        assert_eq!(credited.remaining_tokens, 500);

        let debited = ledger.debit(&user_id, 300).await.unwrap();
        assert_eq!(debited.remaining_tokens, 200);
        assert_eq!(debited.used_tokens, 300);
        assert!(debited.is_consistent());
    }

    #[tokio::test]
    async fn insufficient_balance_is_a_billing_error() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger.credit(&user_id, 10).await.unwrap();

        let err = ledger.debit(&user_id, 11).await.unwrap_err();
        assert!(matches!(
            err,
            BillingError::InsufficientBalance {
                remaining: 10,
                required: 11
            }
        ));
    }

    #[tokio::test]
    async fn settlement_records_usage_past_the_balance() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger.credit(&user_id, 10).await.unwrap();

        let settled = ledger.settle(&user_id, 300).await.unwrap();
        assert_eq!(settled.used_tokens, 300);
        assert_eq!(settled.remaining_tokens, 0);
        assert!(settled.is_exhausted());

        // Strict debits still refuse what the balance cannot cover
        assert!(matches!(
            ledger.debit(&user_id, 1).await,
            Err(BillingError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn zero_amounts_are_rejected_before_the_store() {
        let ledger = ledger();
        let user_id = UserId::generate();

        assert!(matches!(
            ledger.debit(&user_id, 0).await,
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.credit(&user_id, 0).await,
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.debit(&user_id, u64::MAX).await,
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.settle(&user_id, 0).await,
            Err(BillingError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn balance_is_created_on_first_read() {
        let ledger = ledger();
        let balance = ledger
            .get_or_create_balance(&UserId::generate())
            .await
            .unwrap();
        assert!(balance.is_exhausted());
    }
}
