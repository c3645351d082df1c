// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI generation endpoints and the credit ledger.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::cache;
use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    CreditBalance, CreditTransaction, DietPlanDetail, DietPlanRequest, Generated,
    WorkoutPlanDetail, WorkoutPlanRequest,
};
use crate::services::ai::MAX_TRANSACTIONS;
use crate::AppState;

const DEFAULT_TRANSACTIONS: usize = 50;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ai/credits", get(get_credits))
        .route("/api/ai/transactions", get(list_transactions))
        .route("/api/ai/diet-plans", post(generate_diet_plan))
        .route("/api/ai/workout-plans", post(generate_workout_plan))
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub trainer_id: Option<Uuid>,
    pub limit: Option<usize>,
}

async fn get_credits(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<CreditBalance>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let balance = state
        .cache
        .get_or_fetch(
            &cache::key(keys::AI, format!("{}/credits", trainer_id)),
            || state.services.ai.get_credits(trainer_id),
        )
        .await?;
    Ok(Json(balance))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<CreditTransaction>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTIONS)
        .clamp(1, MAX_TRANSACTIONS);
    let transactions = state
        .cache
        .get_or_fetch(
            &cache::key(keys::AI, format!("{}/transactions/{}", trainer_id, limit)),
            || state.services.ai.list_transactions(trainer_id, limit),
        )
        .await?;
    Ok(Json(transactions))
}

fn log_refusal(trainer_id: Uuid, feature: &str, error: &AppError) {
    if let AppError::InsufficientCredits {
        required,
        available,
    } = error
    {
        tracing::info!(
            trainer_id = %trainer_id,
            feature,
            required,
            available,
            "Generation refused: not enough credits"
        );
    }
}

async fn generate_diet_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<DietPlanRequest>,
) -> Result<(StatusCode, Json<Generated<DietPlanDetail>>)> {
    user.require_trainer()?;
    request.validate()?;

    let generated = state
        .services
        .ai
        .generate_diet_plan(user.user_id, request)
        .await
        .inspect_err(|e| log_refusal(user.user_id, "diet_plan", e))?;
    super::invalidate(&state, &[keys::AI, keys::WORKOUTS, keys::TRAINERS]);
    Ok((StatusCode::CREATED, Json(generated)))
}

async fn generate_workout_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<WorkoutPlanRequest>,
) -> Result<(StatusCode, Json<Generated<WorkoutPlanDetail>>)> {
    user.require_trainer()?;
    request.validate()?;

    let generated = state
        .services
        .ai
        .generate_workout_plan(user.user_id, request)
        .await
        .inspect_err(|e| log_refusal(user.user_id, "workout_plan", e))?;
    super::invalidate(&state, &[keys::AI, keys::WORKOUTS, keys::TRAINERS]);
    Ok((StatusCode::CREATED, Json(generated)))
}
