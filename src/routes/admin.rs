// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin dashboard. Every handler requires the admin role.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::privacy::LimitQuery;
use crate::cache;
use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    AuditLog, CreditTransaction, NewAuditLog, PlanTier, SecurityLog, TrainerProfile,
    TrainerSummary, TransactionKind,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/trainers", get(list_trainers))
        .route("/api/admin/trainers/{id}/plan", put(update_plan))
        .route("/api/admin/trainers/{id}/credits", post(add_credits))
        .route("/api/admin/audit-logs", get(list_audit_logs))
        .route("/api/admin/security-logs", get(list_security_logs))
        .route("/api/admin/export", get(export_database))
}

#[derive(Debug, Deserialize)]
pub struct PlanChange {
    pub plan: PlanTier,
}

/// Manual balance adjustment, bounded in both directions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreditGrant {
    #[validate(range(min = -100_000, max = 100_000))]
    pub amount: i64,
    #[serde(default = "default_grant_kind")]
    pub kind: TransactionKind,
    #[validate(length(min = 1, max = 200))]
    pub description: String,
}

fn default_grant_kind() -> TransactionKind {
    TransactionKind::Purchase
}

async fn audit(state: &AppState, entry: NewAuditLog) {
    if let Err(e) = state.services.security.record_audit(entry).await {
        tracing::error!(error = %e, "Failed to write audit log");
    }
}

async fn list_trainers(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<TrainerSummary>>> {
    user.require_admin()?;
    let trainers = state
        .cache
        .get_or_fetch(&cache::key(keys::TRAINERS, "all"), || {
            state.services.trainers.list_trainers()
        })
        .await?;
    Ok(Json(trainers))
}

async fn update_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(trainer_id): Path<Uuid>,
    Json(change): Json<PlanChange>,
) -> Result<Json<TrainerProfile>> {
    user.require_admin()?;
    let before = state.services.trainers.get_trainer(trainer_id).await?;
    let trainer = state
        .services
        .payments
        .update_plan(trainer_id, change.plan)
        .await?;

    tracing::info!(
        admin_id = %user.user_id,
        trainer_id = %trainer_id,
        from = %before.plan,
        to = %trainer.plan,
        "Trainer plan changed by admin"
    );
    audit(
        &state,
        NewAuditLog {
            actor_id: user.user_id,
            action: "update_plan".to_string(),
            entity_type: "trainer_profile".to_string(),
            entity_id: Some(trainer_id.to_string()),
            changes: serde_json::json!({
                "plan": { "from": before.plan, "to": trainer.plan },
                "ai_credits": { "from": before.ai_credits, "to": trainer.ai_credits },
                "max_students": { "from": before.max_students, "to": trainer.max_students },
            }),
        },
    )
    .await;
    super::invalidate(&state, &[keys::TRAINERS, keys::AI, keys::AUTH, keys::SECURITY]);
    Ok(Json(trainer))
}

async fn add_credits(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(trainer_id): Path<Uuid>,
    Json(grant): Json<CreditGrant>,
) -> Result<(StatusCode, Json<CreditTransaction>)> {
    user.require_admin()?;
    grant.validate()?;
    if grant.kind == TransactionKind::Usage {
        return Err(AppError::BadRequest(
            "Usage entries are only written by AI features".to_string(),
        ));
    }
    let transaction = state
        .services
        .ai
        .add_credits(trainer_id, grant.amount, grant.kind, &grant.description)
        .await?;

    audit(
        &state,
        NewAuditLog {
            actor_id: user.user_id,
            action: "add_credits".to_string(),
            entity_type: "trainer_profile".to_string(),
            entity_id: Some(trainer_id.to_string()),
            changes: serde_json::json!({
                "amount": grant.amount,
                "kind": grant.kind,
                "balance_after": transaction.balance_after,
            }),
        },
    )
    .await;
    super::invalidate(&state, &[keys::TRAINERS, keys::AI, keys::AUTH, keys::SECURITY]);
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditLog>>> {
    user.require_admin()?;
    let logs = state
        .services
        .security
        .list_audit_logs(query.resolve())
        .await?;
    Ok(Json(logs))
}

async fn list_security_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SecurityLog>>> {
    user.require_admin()?;
    let logs = state
        .services
        .security
        .list_events(None, query.resolve())
        .await?;
    Ok(Json(logs))
}

/// Full dump of the local document, without credentials.
async fn export_database(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>> {
    user.require_admin()?;
    let store = state.services.local_store.as_ref().ok_or_else(|| {
        AppError::BadRequest("Export is only available on the local backend".to_string())
    })?;
    let export = store.export().await?;
    tracing::info!(admin_id = %user.user_id, "Local database exported");
    Ok(Json(export))
}
