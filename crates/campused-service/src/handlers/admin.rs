//! Admin handlers for plan management.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use campused_core::Plan;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::subscriptions::PlanResponse;
use crate::state::AppState;

/// Plan creation request.
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    /// Display name.
    pub name: String,
    /// Tokens granted on purchase.
    pub token_limit: i64,
    /// Price in paise.
    pub price_paise: i64,
    /// Marketing description.
    #[serde(default)]
    pub description: String,
    /// Feature bullet points.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Create a subscription plan.
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    payload: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlanResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let plan = Plan::new(
        request.name,
        request.token_limit,
        request.price_paise,
        request.description,
        request.features,
    )?;
    state.store.put_plan(&plan).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        plan_id = %plan.id,
        name = %plan.name,
        token_limit = plan.token_limit,
        price_paise = plan.price_paise,
        "Plan created"
    );

    Ok((StatusCode::CREATED, Json(PlanResponse::from(&plan))))
}
