//! PostgreSQL storage implementation.
//!
//! Balance mutations follow one shape: open a transaction, make sure the row
//! exists, lock it with `SELECT ... FOR UPDATE`, apply the change in memory
//! through `CreditBalance`, write it back, commit. A failed check drops the
//! transaction, which rolls it back. Order claims take the order row and then
//! the balance row inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use campused_core::{
    BillingError, Channel, ChannelId, ChatMessage, CostBreakdown, CreditBalance, Exam, ExamId,
    ExamMode, Order, OrderId, Plan, PlanId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{ClaimedOrder, Store};

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Insert the zero row if absent, then lock and return it.
    async fn lock_balance(conn: &mut PgConnection, user_id: &UserId) -> Result<CreditBalance> {
        sqlx::query("INSERT INTO credit_balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(*user_id.as_uuid())
            .execute(&mut *conn)
            .await?;

        let row: BalanceRow = sqlx::query_as(
            r"
            SELECT user_id, total_tokens, used_tokens, remaining_tokens, last_updated
            FROM credit_balances
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(*user_id.as_uuid())
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.into())
    }

    async fn write_balance(conn: &mut PgConnection, balance: &CreditBalance) -> Result<()> {
        sqlx::query(
            r"
            UPDATE credit_balances
            SET total_tokens = $2, used_tokens = $3, remaining_tokens = $4, last_updated = $5
            WHERE user_id = $1
            ",
        )
        .bind(*balance.user_id.as_uuid())
        .bind(balance.total_tokens)
        .bind(balance.used_tokens)
        .bind(balance.remaining_tokens)
        .bind(balance.last_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Lock the row, let `apply` change it, persist, commit.
    async fn mutate_balance<F>(&self, user_id: &UserId, apply: F) -> Result<CreditBalance>
    where
        F: FnOnce(&mut CreditBalance) -> campused_core::Result<()> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let mut balance = Self::lock_balance(&mut tx, user_id).await?;
        apply(&mut balance)?;
        Self::write_balance(&mut tx, &balance).await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn fetch_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Order> {
        let row: OrderRow = sqlx::query_as(&format!("{ORDER_SELECT} WHERE o.id = $1"))
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    async fn get_or_create_balance(&self, user_id: &UserId) -> Result<CreditBalance> {
        sqlx::query("INSERT INTO credit_balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(*user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        let row: BalanceRow = sqlx::query_as(
            "SELECT user_id, total_tokens, used_tokens, remaining_tokens, last_updated FROM credit_balances WHERE user_id = $1",
        )
        .bind(*user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn debit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        self.mutate_balance(user_id, |balance| balance.apply_debit(tokens))
            .await
    }

    async fn consume_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        self.mutate_balance(user_id, |balance| balance.apply_usage(tokens))
            .await
    }

    async fn credit_tokens(&self, user_id: &UserId, tokens: i64) -> Result<CreditBalance> {
        self.mutate_balance(user_id, |balance| balance.apply_credit(tokens))
            .await
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO plans (id, name, token_limit, price_paise, description, features)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                token_limit = EXCLUDED.token_limit,
                price_paise = EXCLUDED.price_paise,
                description = EXCLUDED.description,
                features = EXCLUDED.features
            ",
        )
        .bind(*plan.id.as_uuid())
        .bind(&plan.name)
        .bind(plan.token_limit)
        .bind(plan.price_paise)
        .bind(&plan.description)
        .bind(Json(&plan.features))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT id, name, token_limit, price_paise, description, features FROM plans WHERE id = $1",
        )
        .bind(*plan_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(
            "SELECT id, name, token_limit, price_paise, description, features FROM plans ORDER BY token_limit, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn create_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO orders (id, user_id, plan_id, amount_paise, currency, gateway_order_id,
                                gateway_payment_id, gateway_signature, is_paid, created_at, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(*order.id.as_uuid())
        .bind(*order.user_id.as_uuid())
        .bind(order.plan.as_ref().map(|p| *p.id.as_uuid()))
        .bind(order.amount_paise)
        .bind(&order.currency)
        .bind(&order.gateway_order_id)
        .bind(&order.gateway_payment_id)
        .bind(&order.gateway_signature)
        .bind(order.is_paid)
        .bind(order.created_at)
        .bind(order.paid_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("{ORDER_SELECT} WHERE o.gateway_order_id = $1"))
                .bind(gateway_order_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn claim_and_credit(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Option<ClaimedOrder>> {
        let mut tx = self.pool.begin().await?;

        // The conditional update is the claim: exactly one caller sees a row.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r"
            UPDATE orders
            SET is_paid = true,
                paid_at = now(),
                gateway_payment_id = $2,
                gateway_signature = COALESCE($3, gateway_signature)
            WHERE gateway_order_id = $1 AND is_paid = false
            RETURNING id
            ",
        )
        .bind(gateway_order_id)
        .bind(payment_id)
        .bind(signature)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((order_id,)) = claimed else {
            return Ok(None);
        };
        let order = Self::fetch_order(&mut tx, order_id).await?;

        let balance = match order.token_grant() {
            Ok(tokens) => {
                let mut balance = Self::lock_balance(&mut tx, &order.user_id).await?;
                balance.apply_credit(tokens)?;
                Self::write_balance(&mut tx, &balance).await?;
                Some(balance)
            }
            Err(BillingError::NoPlanLinked { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(Some(ClaimedOrder { order, balance }))
    }

    // =========================================================================
    // Channel Operations
    // =========================================================================

    async fn put_channel(&self, channel: &Channel) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO channels (id, user_id, title, context, token_cost, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                context = EXCLUDED.context,
                token_cost = EXCLUDED.token_cost,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(*channel.id.as_uuid())
        .bind(*channel.user_id.as_uuid())
        .bind(&channel.title)
        .bind(Json(&channel.context))
        .bind(channel.token_cost.as_ref().map(Json))
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_channel(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Result<Option<Channel>> {
        let row: Option<ChannelRow> = sqlx::query_as(
            r"
            SELECT id, user_id, title, context, token_cost, created_at, updated_at
            FROM channels
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(*channel_id.as_uuid())
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_channels(&self, user_id: &UserId) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            r"
            SELECT id, user_id, title, context, token_cost, created_at, updated_at
            FROM channels
            WHERE user_id = $1
            ORDER BY updated_at DESC
            ",
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Exam Operations
    // =========================================================================

    async fn put_exam(&self, exam: &Exam) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO exams (id, user_id, exam, subject, difficulty, language, mode,
                               questions, token_cost, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET questions = EXCLUDED.questions,
                token_cost = EXCLUDED.token_cost,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(*exam.id.as_uuid())
        .bind(*exam.user_id.as_uuid())
        .bind(&exam.exam)
        .bind(&exam.subject)
        .bind(exam.difficulty.as_str())
        .bind(exam.language.as_str())
        .bind(exam.mode.as_str())
        .bind(Json(&exam.questions))
        .bind(exam.token_cost.as_ref().map(Json))
        .bind(exam.created_at)
        .bind(exam.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_exam(&self, user_id: &UserId, exam_id: &ExamId) -> Result<Option<Exam>> {
        let row: Option<ExamRow> = sqlx::query_as(&format!(
            "{EXAM_SELECT} WHERE id = $1 AND user_id = $2"
        ))
        .bind(*exam_id.as_uuid())
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamRow::into_exam).transpose()
    }

    async fn list_exams(&self, user_id: &UserId) -> Result<Vec<Exam>> {
        let rows: Vec<ExamRow> = sqlx::query_as(&format!(
            "{EXAM_SELECT} WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExamRow::into_exam).collect()
    }
}

// ============================================================================
// Row types
// ============================================================================

const ORDER_SELECT: &str = r"
    SELECT o.id, o.user_id, o.amount_paise, o.currency, o.gateway_order_id,
           o.gateway_payment_id, o.gateway_signature, o.is_paid, o.created_at, o.paid_at,
           p.id AS plan_id, p.name AS plan_name, p.token_limit AS plan_token_limit,
           p.price_paise AS plan_price_paise, p.description AS plan_description,
           p.features AS plan_features
    FROM orders o
    LEFT JOIN plans p ON p.id = o.plan_id
";

const EXAM_SELECT: &str = r"
    SELECT id, user_id, exam, subject, difficulty, language, mode, questions, token_cost,
           created_at, updated_at
    FROM exams
";

#[derive(sqlx::FromRow)]
struct BalanceRow {
    user_id: Uuid,
    total_tokens: i64,
    used_tokens: i64,
    remaining_tokens: i64,
    last_updated: DateTime<Utc>,
}

impl From<BalanceRow> for CreditBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            total_tokens: row.total_tokens,
            used_tokens: row.used_tokens,
            remaining_tokens: row.remaining_tokens,
            last_updated: row.last_updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    token_limit: i64,
    price_paise: i64,
    description: String,
    features: Json<Vec<String>>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            token_limit: row.token_limit,
            price_paise: row.price_paise,
            description: row.description,
            features: row.features.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    amount_paise: i64,
    currency: String,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    is_paid: bool,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    plan_id: Option<Uuid>,
    plan_name: Option<String>,
    plan_token_limit: Option<i64>,
    plan_price_paise: Option<i64>,
    plan_description: Option<String>,
    plan_features: Option<Json<Vec<String>>>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        let plan = match (row.plan_id, row.plan_name, row.plan_token_limit, row.plan_price_paise) {
            (Some(id), Some(name), Some(token_limit), Some(price_paise)) => Some(Plan {
                id: PlanId::from_uuid(id),
                name,
                token_limit,
                price_paise,
                description: row.plan_description.unwrap_or_default(),
                features: row.plan_features.map(|f| f.0).unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            id: OrderId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan,
            amount_paise: row.amount_paise,
            currency: row.currency,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            gateway_signature: row.gateway_signature,
            is_paid: row.is_paid,
            created_at: row.created_at,
            paid_at: row.paid_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    context: Json<Vec<ChatMessage>>,
    token_cost: Option<Json<CostBreakdown>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: ChannelId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            title: row.title,
            context: row.context.0,
            token_cost: row.token_cost.map(|c| c.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExamRow {
    id: Uuid,
    user_id: Uuid,
    exam: String,
    subject: String,
    difficulty: String,
    language: String,
    mode: String,
    questions: Json<serde_json::Value>,
    token_cost: Option<Json<CostBreakdown>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExamRow {
    fn into_exam(self) -> Result<Exam> {
        let mode: ExamMode = parse_text(&self.mode)?;
        let questions = mode.questions_from_value(self.questions.0)?;

        Ok(Exam {
            id: ExamId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            exam: self.exam,
            subject: self.subject,
            difficulty: parse_text(&self.difficulty)?,
            language: parse_text(&self.language)?,
            mode,
            questions,
            token_cost: self.token_cost.map(|c| c.0),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Decode a serde unit variant stored as TEXT.
fn parse_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        text.to_string(),
    ))?)
}
