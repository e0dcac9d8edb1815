//! Storage layer for campused.
//!
//! This crate persists balances, plans, orders, channels and exams behind the
//! [`Store`] trait, and builds the [`CreditLedger`] on top of it.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`. Balance mutations run in a
//!   transaction holding `SELECT ... FOR UPDATE` on the balance row.
//! - [`MemoryStore`]: in-process maps with one async mutex per balance row,
//!   for tests and local development.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use campused_core::UserId;
//! use campused_store::{CreditLedger, MemoryStore};
//!
//! # async fn run() -> campused_core::Result<()> {
//! let ledger = CreditLedger::new(Arc::new(MemoryStore::new()));
//! let user = UserId::generate();
//!
//! ledger.credit(&user, 1_000).await?;
//! let balance = ledger.debit(&user, 300).await?;
//! assert_eq!(balance.remaining_tokens, 700);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use ledger::CreditLedger;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use campused_core::{
    Channel, ChannelId, CreditBalance, Exam, ExamId, Order, Plan, PlanId, UserId,
};

/// An order marked paid by [`Store::claim_and_credit`].
#[derive(Debug, Clone)]
pub struct ClaimedOrder {
    /// The order, now paid.
    pub order: Order,
    /// Balance after the plan's grant; `None` when the order has no plan.
    pub balance: Option<CreditBalance>,
}

/// The storage trait defining all database operations.
///
/// Only the balance operations mutate `CreditBalance`, and each of them is
/// atomic with respect to other mutations of the same user's balance.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Return the user's balance, creating an all-zero one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_or_create_balance(&self, user_id: &UserId) -> Result<CreditBalance>;

    /// Atomically consume `tokens` from the user's balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientBalance` if fewer than `tokens` remain; the
    ///   balance is left unchanged.
    /// - `StoreError::InvalidAmount` if `tokens` is not positive.
    async fn debit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance>;

    /// Atomically record `tokens` of settled usage. Never refused for lack of
    /// balance: `remaining_tokens` is clamped at zero instead.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidAmount` if `tokens` is not positive or
    /// overflows the usage counter.
    async fn consume_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance>;

    /// Atomically grant `tokens` to the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidAmount` if `tokens` is not positive or
    /// overflows the grant counter.
    async fn credit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance>;

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Insert or update a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>>;

    /// List plans, smallest token grant first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_plans(&self) -> Result<Vec<Plan>>;

    // =========================================================================
    // Order Operations
    // =========================================================================

    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the gateway order ID is already used.
    async fn create_order(&self, order: &Order) -> Result<()>;

    /// Find an order by its gateway order ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>>;

    /// Mark an order paid if, and only if, it is currently unpaid, and credit
    /// its plan's tokens to the buyer in the same atomic step.
    ///
    /// Returns the claim to the single caller that performed the
    /// false-to-true transition, and `None` to everyone else (including when
    /// no such order exists). If the credit fails the order stays unpaid, so
    /// a retried confirmation can still activate it.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if the grant would overflow the balance.
    /// - `StoreError::Database` if the database operation fails.
    async fn claim_and_credit(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Option<ClaimedOrder>>;

    // =========================================================================
    // Channel Operations
    // =========================================================================

    /// Insert or update a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_channel(&self, channel: &Channel) -> Result<()>;

    /// Get a channel owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_channel(&self, user_id: &UserId, channel_id: &ChannelId)
        -> Result<Option<Channel>>;

    /// List a user's channels, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_channels(&self, user_id: &UserId) -> Result<Vec<Channel>>;

    // =========================================================================
    // Exam Operations
    // =========================================================================

    /// Insert or update an exam.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_exam(&self, exam: &Exam) -> Result<()>;

    /// Get an exam owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_exam(&self, user_id: &UserId, exam_id: &ExamId) -> Result<Option<Exam>>;

    /// List a user's exams, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_exams(&self, user_id: &UserId) -> Result<Vec<Exam>>;
}
