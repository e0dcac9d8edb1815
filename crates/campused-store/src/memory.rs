//! In-memory storage implementation.
//!
//! Each balance lives behind its own `tokio::sync::Mutex`, which plays the role
//! of the row lock: mutations of one user's balance serialize, different users
//! never contend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use campused_core::{
    BillingError, Channel, ChannelId, CreditBalance, Exam, ExamId, Order, OrderId, Plan, PlanId,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::{ClaimedOrder, Store};

/// In-memory `Store`.
#[derive(Default)]
pub struct MemoryStore {
    balances: RwLock<HashMap<UserId, Arc<Mutex<CreditBalance>>>>,
    plans: RwLock<HashMap<PlanId, Plan>>,
    orders: Mutex<HashMap<OrderId, Order>>,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    exams: RwLock<HashMap<ExamId, Exam>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding one user's balance, created on first use.
    async fn balance_row(&self, user_id: &UserId) -> Arc<Mutex<CreditBalance>> {
        if let Some(row) = self.balances.read().await.get(user_id) {
            return Arc::clone(row);
        }

        let mut balances = self.balances.write().await;
        Arc::clone(
            balances
                .entry(*user_id)
                .or_insert_with(|| Arc::new(Mutex::new(CreditBalance::new(*user_id)))),
        )
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    async fn get_or_create_balance(&self, user_id: &UserId) -> Result<CreditBalance> {
        let row = self.balance_row(user_id).await;
        let balance = row.lock().await.clone();
        Ok(balance)
    }

    async fn debit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        let row = self.balance_row(user_id).await;
        let mut balance = row.lock().await;

        // Work on a copy so a failed debit leaves the row untouched.
        let mut updated = balance.clone();
        updated.apply_debit(tokens)?;
        *balance = updated;

        Ok(balance.clone())
    }

    async fn consume_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        let row = self.balance_row(user_id).await;
        let mut balance = row.lock().await;

        let mut updated = balance.clone();
        updated.apply_usage(tokens)?;
        *balance = updated;

        Ok(balance.clone())
    }

    async fn credit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        let row = self.balance_row(user_id).await;
        let mut balance = row.lock().await;

        let mut updated = balance.clone();
        updated.apply_credit(tokens)?;
        *balance = updated;

        Ok(balance.clone())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.plans.write().await.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        Ok(self.plans.read().await.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self.plans.read().await.values().cloned().collect();
        plans.sort_by(|a, b| {
            a.token_limit
                .cmp(&b.token_limit)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(plans)
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().await;

        if let Some(gateway_id) = &order.gateway_order_id {
            let taken = orders
                .values()
                .any(|o| o.gateway_order_id.as_ref() == Some(gateway_id));
            if taken {
                return Err(StoreError::Conflict(format!(
                    "gateway order {gateway_id} already exists"
                )));
            }
        }

        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.lock().await;
        Ok(orders
            .values()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn claim_and_credit(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Option<ClaimedOrder>> {
        // Orders lock first, then the balance row. Nothing locks the other way.
        let mut orders = self.orders.lock().await;

        let Some(order) = orders
            .values_mut()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
        else {
            return Ok(None);
        };

        if order.is_paid {
            return Ok(None);
        }

        let balance = match order.token_grant() {
            Ok(tokens) => {
                let row = self.balance_row(&order.user_id).await;
                let mut balance = row.lock().await;

                // Both writes happen only once the credit has succeeded.
                let mut updated = balance.clone();
                updated.apply_credit(tokens)?;
                *balance = updated;
                Some(balance.clone())
            }
            Err(BillingError::NoPlanLinked { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        order.is_paid = true;
        order.paid_at = Some(Utc::now());
        order.gateway_payment_id = Some(payment_id.to_string());
        if let Some(signature) = signature {
            order.gateway_signature = Some(signature.to_string());
        }

        Ok(Some(ClaimedOrder {
            order: order.clone(),
            balance,
        }))
    }

    // =========================================================================
    // Channel Operations
    // =========================================================================

    async fn put_channel(&self, channel: &Channel) -> Result<()> {
        self.channels
            .write()
            .await
            .insert(channel.id, channel.clone());
        Ok(())
    }

    async fn get_channel(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Result<Option<Channel>> {
        Ok(self
            .channels
            .read()
            .await
            .get(channel_id)
            .filter(|c| c.user_id == *user_id)
            .cloned())
    }

    async fn list_channels(&self, user_id: &UserId) -> Result<Vec<Channel>> {
        let mut channels: Vec<Channel> = self
            .channels
            .read()
            .await
            .values()
            .filter(|c| c.user_id == *user_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(channels)
    }

    // =========================================================================
    // Exam Operations
    // =========================================================================

    async fn put_exam(&self, exam: &Exam) -> Result<()> {
        self.exams.write().await.insert(exam.id, exam.clone());
        Ok(())
    }

    async fn get_exam(&self, user_id: &UserId, exam_id: &ExamId) -> Result<Option<Exam>> {
        Ok(self
            .exams
            .read()
            .await
            .get(exam_id)
            .filter(|e| e.user_id == *user_id)
            .cloned())
    }

    async fn list_exams(&self, user_id: &UserId) -> Result<Vec<Exam>> {
        let mut exams: Vec<Exam> = self
            .exams
            .read()
            .await
            .values()
            .filter(|e| e.user_id == *user_id)
            .cloned()
            .collect();
        exams.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(exams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(token_limit: i64) -> Plan {
        Plan::new(format!("Plan {token_limit}"), token_limit, 9_900, "", vec![]).unwrap()
    }

    #[tokio::test]
    async fn balance_is_created_lazily() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let balance = store.get_or_create_balance(&user_id).await.unwrap();
        assert_eq!(balance.total_tokens, 0);
        assert_eq!(balance.remaining_tokens, 0);
        assert_eq!(balance.user_id, user_id);
    }

    #[tokio::test]
    async fn debit_and_credit() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        store.credit_tokens(&user_id, 500).await.unwrap();
        let balance = store.debit_tokens(&user_id, 300).await.unwrap();

        assert_eq!(balance.used_tokens, 300);
        assert_eq!(balance.remaining_tokens, 200);
        assert!(balance.is_consistent());
    }

    #[tokio::test]
    async fn over_debit_fails_and_changes_nothing() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.credit_tokens(&user_id, 100).await.unwrap();

        let err = store.debit_tokens(&user_id, 150).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientBalance {
                remaining: 100,
                required: 150
            }
        ));

        let balance = store.get_or_create_balance(&user_id).await.unwrap();
        assert_eq!(balance.used_tokens, 0);
        assert_eq!(balance.remaining_tokens, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_lose_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store.credit_tokens(&user_id, 1_000).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.debit_tokens(&user_id, 75).await.is_ok() })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        let balance = store.get_or_create_balance(&user_id).await.unwrap();
        assert_eq!(successes, 13);
        assert_eq!(balance.used_tokens, 975);
        assert_eq!(balance.remaining_tokens, 25);
    }

    #[tokio::test]
    async fn plans_are_listed_by_token_limit() {
        let store = MemoryStore::new();
        store.put_plan(&plan(50_000)).await.unwrap();
        store.put_plan(&plan(10_000)).await.unwrap();
        store.put_plan(&plan(25_000)).await.unwrap();

        let limits: Vec<i64> = store
            .list_plans()
            .await
            .unwrap()
            .iter()
            .map(|p| p.token_limit)
            .collect();
        assert_eq!(limits, vec![10_000, 25_000, 50_000]);
    }

    #[tokio::test]
    async fn usage_is_recorded_past_the_remainder() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.credit_tokens(&user_id, 10).await.unwrap();

        let balance = store.consume_tokens(&user_id, 300).await.unwrap();

        assert_eq!(balance.used_tokens, 300);
        assert_eq!(balance.remaining_tokens, 0);
        assert!(balance.is_consistent());
    }

    #[tokio::test]
    async fn order_is_claimed_and_credited_once() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let order = Order::new(user_id, plan(10_000), "order_1");
        store.create_order(&order).await.unwrap();

        let first = store
            .claim_and_credit("order_1", "pay_1", Some("sig"))
            .await
            .unwrap()
            .unwrap();
        assert!(first.order.is_paid);
        assert_eq!(first.order.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(first.order.gateway_signature.as_deref(), Some("sig"));
        assert_eq!(first.balance.unwrap().total_tokens, 10_000);

        let second = store
            .claim_and_credit("order_1", "pay_1", None)
            .await
            .unwrap();
        assert!(second.is_none());

        let unknown = store
            .claim_and_credit("order_404", "pay_1", None)
            .await
            .unwrap();
        assert!(unknown.is_none());

        let balance = store.get_or_create_balance(&user_id).await.unwrap();
        assert_eq!(balance.total_tokens, 10_000);
    }

    #[tokio::test]
    async fn failed_credit_leaves_the_order_unpaid() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.credit_tokens(&user_id, i64::MAX - 5).await.unwrap();
        store
            .create_order(&Order::new(user_id, plan(10_000), "order_full"))
            .await
            .unwrap();

        let err = store
            .claim_and_credit("order_full", "pay_1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(_)));

        let order = store
            .get_order_by_gateway_id("order_full")
            .await
            .unwrap()
            .unwrap();
        assert!(!order.is_paid);
        assert!(order.gateway_payment_id.is_none());
    }

    #[tokio::test]
    async fn order_without_plan_is_claimed_without_credit() {
        let store = MemoryStore::new();
        let mut order = Order::new(UserId::generate(), plan(10_000), "order_orphan");
        order.plan = None;
        store.create_order(&order).await.unwrap();

        let claimed = store
            .claim_and_credit("order_orphan", "pay_1", None)
            .await
            .unwrap()
            .unwrap();
        assert!(claimed.order.is_paid);
        assert!(claimed.balance.is_none());
    }

    #[tokio::test]
    async fn duplicate_gateway_order_is_rejected() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store
            .create_order(&Order::new(user_id, plan(1), "order_dup"))
            .await
            .unwrap();

        let err = store
            .create_order(&Order::new(user_id, plan(1), "order_dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn channels_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let channel = Channel::new(owner, Some("Kinematics".into()));
        store.put_channel(&channel).await.unwrap();

        assert!(store
            .get_channel(&owner, &channel.id)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_channel(&UserId::generate(), &channel.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list_channels(&owner).await.unwrap().len(), 1);
    }
}
