//! Credit balance handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Tokens granted over the account's lifetime.
    pub total_tokens: i64,
    /// Tokens consumed over the account's lifetime.
    pub used_tokens: i64,
    /// Tokens left.
    pub remaining_tokens: i64,
    /// When the balance last changed.
    pub last_updated: DateTime<Utc>,
}

/// Get the caller's token balance, creating an empty one on first use.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.get_or_create_balance(&auth.user_id).await?;

    Ok(Json(BalanceResponse {
        total_tokens: balance.total_tokens,
        used_tokens: balance.used_tokens,
        remaining_tokens: balance.remaining_tokens,
        last_updated: balance.last_updated,
    }))
}
