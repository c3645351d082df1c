// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plans, subscriptions and payment intents.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::trainer::TrainerQuery;
use crate::cache;
use crate::config::BackendKind;
use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    AiFeature, CreditPackage, PaymentIntent, PaymentPurpose, PlanLimits, PlanTier, Role,
    Subscription, SubscriptionCheckout, SubscriptionStatus,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/plans", get(plan_catalog))
        .route(
            "/api/subscription",
            get(get_subscription)
                .post(create_subscription)
                .delete(cancel_subscription),
        )
        .route("/api/payments", get(list_payments).post(create_payment))
        .route("/api/payments/{id}", get(get_payment))
        .route("/api/payments/{id}/confirm", post(confirm_payment))
}

#[derive(Debug, Serialize)]
pub struct PlanOffer {
    pub plan: PlanTier,
    #[serde(flatten)]
    pub limits: PlanLimits,
}

#[derive(Debug, Serialize)]
pub struct PackageOffer {
    pub package: CreditPackage,
    pub credits: i64,
    pub price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct FeatureCost {
    pub feature: AiFeature,
    pub credits: i64,
}

/// Everything a trainer can buy, with prices.
#[derive(Debug, Serialize)]
pub struct PlanCatalog {
    pub plans: Vec<PlanOffer>,
    pub credit_packages: Vec<PackageOffer>,
    pub feature_costs: Vec<FeatureCost>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan: PlanTier,
}

async fn plan_catalog() -> Json<PlanCatalog> {
    Json(PlanCatalog {
        plans: PlanTier::ALL
            .iter()
            .map(|&plan| PlanOffer {
                plan,
                limits: plan.limits(),
            })
            .collect(),
        credit_packages: [
            CreditPackage::Starter,
            CreditPackage::Standard,
            CreditPackage::Bulk,
        ]
        .iter()
        .map(|&package| PackageOffer {
            package,
            credits: package.credits(),
            price_cents: package.price_cents(),
        })
        .collect(),
        feature_costs: [AiFeature::DietPlan, AiFeature::WorkoutPlan]
            .iter()
            .map(|&feature| FeatureCost {
                feature,
                credits: feature.cost(),
            })
            .collect(),
    })
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Option<Subscription>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    // Not cached: reading may end a lapsed cancellation.
    let subscription = state
        .services
        .payments
        .get_subscription(trainer_id)
        .await?;
    if subscription
        .as_ref()
        .is_some_and(|s| s.status != SubscriptionStatus::Active)
    {
        super::invalidate(
            &state,
            &[keys::PAYMENTS, keys::TRAINERS, keys::AI, keys::AUTH],
        );
    }
    Ok(Json(subscription))
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscriptionCheckout>)> {
    user.require_trainer()?;
    let checkout = state
        .services
        .payments
        .create_subscription(user.user_id, request.plan)
        .await?;
    tracing::info!(
        trainer_id = %user.user_id,
        plan = %request.plan,
        subscription_id = %checkout.subscription.id,
        "Subscription created"
    );
    super::invalidate(&state, &[keys::PAYMENTS, keys::TRAINERS, keys::AI]);
    Ok((StatusCode::CREATED, Json(checkout)))
}

async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Subscription>> {
    user.require_trainer()?;
    let subscription = state
        .services
        .payments
        .cancel_subscription(user.user_id)
        .await?;
    tracing::info!(
        trainer_id = %user.user_id,
        ends_at = %subscription.current_period_end,
        "Subscription set to cancel at period end"
    );
    super::invalidate(&state, &[keys::PAYMENTS]);
    Ok(Json(subscription))
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Vec<PaymentIntent>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let payments = state
        .cache
        .get_or_fetch(&cache::key(keys::PAYMENTS, trainer_id), || {
            state.services.payments.list_payments(trainer_id)
        })
        .await?;
    Ok(Json(payments))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(purpose): Json<PaymentPurpose>,
) -> Result<(StatusCode, Json<PaymentIntent>)> {
    user.require_trainer()?;
    let intent = state
        .services
        .payments
        .create_payment_intent(user.user_id, purpose)
        .await?;
    tracing::info!(
        trainer_id = %user.user_id,
        intent_id = %intent.id,
        amount_cents = intent.amount_cents,
        "Payment intent created"
    );
    super::invalidate(&state, &[keys::PAYMENTS]);
    Ok((StatusCode::CREATED, Json(intent)))
}

/// Load a payment the caller may see. Others' payments look missing.
async fn owned_payment(state: &AppState, user: &AuthUser, intent_id: Uuid) -> Result<PaymentIntent> {
    let intent = state.services.payments.get_payment(intent_id).await?;
    if intent.trainer_id != user.user_id && user.role != Role::Admin {
        return Err(AppError::NotFound(format!("Payment {} not found", intent_id)));
    }
    Ok(intent)
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<PaymentIntent>> {
    Ok(Json(owned_payment(&state, &user, intent_id).await?))
}

/// Simulated checkout for the local backend. Remote payments are confirmed
/// by the provider webhook.
async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<PaymentIntent>> {
    if state.services.backend != BackendKind::Local {
        return Err(AppError::Forbidden(
            "Payments are confirmed by the payment provider".to_string(),
        ));
    }
    owned_payment(&state, &user, intent_id).await?;

    let intent = state.services.payments.confirm_payment(intent_id).await?;
    tracing::info!(intent_id = %intent_id, status = ?intent.status, "Payment confirmed");
    super::invalidate(&state, &[keys::PAYMENTS, keys::TRAINERS, keys::AI, keys::AUTH]);
    Ok(Json(intent))
}
