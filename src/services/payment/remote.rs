// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted billing: charges are created by server-side functions and
//! confirmed by the provider webhook.

use super::{
    check_purchase, needs_fulfilment, no_active_subscription, payment_not_found, PaymentService,
};
use crate::config::Config;
use crate::db::{functions, tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    PaymentEvent, PaymentIntent, PaymentPurpose, PaymentStatus, PlanTier, Subscription,
    SubscriptionCheckout, SubscriptionStatus, TrainerProfile, TransactionKind,
};
use crate::services::ledger::{self, CreditChange};
use crate::time_utils::billing_period_end;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider price ids for the paid tiers.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub pro: Option<String>,
    pub elite: Option<String>,
}

impl PriceIds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pro: config.price_id_pro.clone(),
            elite: config.price_id_elite.clone(),
        }
    }

    fn for_plan(&self, plan: PlanTier) -> Option<&str> {
        match plan {
            PlanTier::Free => None,
            PlanTier::Pro => self.pro.as_deref(),
            PlanTier::Elite => self.elite.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IntentRequest<'a> {
    payment_id: Uuid,
    trainer_id: Uuid,
    amount_cents: i64,
    currency: &'a str,
    description: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    provider_intent_id: String,
    client_secret: String,
}

#[derive(Debug, Serialize)]
struct SubscriptionRequest<'a> {
    payment_id: Uuid,
    trainer_id: Uuid,
    plan: PlanTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    provider_subscription_id: String,
    provider_intent_id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

pub struct RemotePaymentService {
    db: RemoteDb,
    prices: PriceIds,
}

impl RemotePaymentService {
    pub fn new(db: RemoteDb, prices: PriceIds) -> Self {
        Self { db, prices }
    }

    async fn active_subscription(&self, trainer_id: Uuid) -> Result<Option<Subscription>, AppError> {
        self.db
            .from(tables::SUBSCRIPTIONS)?
            .eq("trainer_id", trainer_id)
            .eq("status", "active")
            .order("created_at", false)
            .fetch_one()
            .await
    }

    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.db
            .from(tables::SUBSCRIPTIONS)?
            .eq("id", subscription_id)
            .update::<_, Subscription>(&serde_json::json!({
                "status": status,
                "updated_at": now,
            }))
            .await?;
        Ok(())
    }

    /// Make `plan` the trainer's only active subscription and apply its limits.
    async fn activate_subscription(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let pending: Option<Subscription> = self
            .db
            .from(tables::SUBSCRIPTIONS)?
            .eq("trainer_id", trainer_id)
            .eq("plan", plan)
            .eq("status", "incomplete")
            .order("created_at", false)
            .fetch_one()
            .await?;

        let keep = match pending {
            Some(sub) => {
                self.db
                    .from(tables::SUBSCRIPTIONS)?
                    .eq("id", sub.id)
                    .update::<_, Subscription>(&serde_json::json!({
                        "status": SubscriptionStatus::Active,
                        "current_period_start": now,
                        "current_period_end": billing_period_end(now),
                        "updated_at": now,
                    }))
                    .await?;
                sub.id
            }
            None => {
                let sub =
                    Subscription::new(trainer_id, plan, SubscriptionStatus::Active, None, now);
                self.db
                    .from(tables::SUBSCRIPTIONS)?
                    .insert::<_, Subscription>(&sub)
                    .await?;
                sub.id
            }
        };

        self.db
            .from(tables::SUBSCRIPTIONS)?
            .eq("trainer_id", trainer_id)
            .eq("status", "active")
            .neq("id", keep)
            .update::<_, Subscription>(&serde_json::json!({
                "status": SubscriptionStatus::Canceled,
                "updated_at": now,
            }))
            .await?;

        ledger::change_plan_remote(&self.db, trainer_id, plan).await?;
        Ok(())
    }

    async fn fulfil(&self, intent: &PaymentIntent) -> Result<(), AppError> {
        match intent.purpose {
            PaymentPurpose::Subscription { plan } => {
                self.activate_subscription(intent.trainer_id, plan, Utc::now())
                    .await?;
            }
            PaymentPurpose::Credits { package } => {
                ledger::apply_remote(
                    &self.db,
                    intent.trainer_id,
                    CreditChange::grant(
                        package.credits(),
                        TransactionKind::Purchase,
                        intent.purpose.description(),
                    ),
                )
                .await?;
            }
        }
        tracing::info!(
            payment_id = %intent.id,
            trainer_id = %intent.trainer_id,
            amount_cents = intent.amount_cents,
            "Payment fulfilled"
        );
        Ok(())
    }
}

#[async_trait]
impl PaymentService for RemotePaymentService {
    async fn get_subscription(&self, trainer_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let latest: Option<Subscription> = self
            .db
            .from(tables::SUBSCRIPTIONS)?
            .eq("trainer_id", trainer_id)
            .order("created_at", false)
            .fetch_one()
            .await?;

        let now = Utc::now();
        match latest {
            Some(mut sub) if sub.has_lapsed(now) => {
                // Only the request that ends the still-active row downgrades;
                // a subscription replaced or ended meanwhile is left alone.
                let ended: Vec<Subscription> = self
                    .db
                    .from(tables::SUBSCRIPTIONS)?
                    .eq("id", sub.id)
                    .eq("status", "active")
                    .update(&serde_json::json!({
                        "status": SubscriptionStatus::Canceled,
                        "updated_at": now,
                    }))
                    .await?;
                if ended.is_empty() {
                    return self
                        .db
                        .from(tables::SUBSCRIPTIONS)?
                        .eq("trainer_id", trainer_id)
                        .order("created_at", false)
                        .fetch_one()
                        .await;
                }
                ledger::change_plan_remote(&self.db, trainer_id, PlanTier::Free).await?;
                tracing::info!(trainer_id = %trainer_id, plan = %sub.plan, "Subscription lapsed");
                sub.status = SubscriptionStatus::Canceled;
                sub.updated_at = now;
                Ok(Some(sub))
            }
            other => Ok(other),
        }
    }

    async fn create_subscription(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
    ) -> Result<SubscriptionCheckout, AppError> {
        let purpose = PaymentPurpose::Subscription { plan };
        check_purchase(&purpose)?;
        ledger::fetch_trainer(&self.db, trainer_id).await?;
        if let Some(active) = self.active_subscription(trainer_id).await? {
            if active.plan == plan {
                return Err(AppError::Conflict(format!(
                    "Already subscribed to the {} plan",
                    plan
                )));
            }
        }

        let now = Utc::now();
        let mut intent = PaymentIntent::new(trainer_id, purpose, now);
        let response: SubscriptionResponse = self
            .db
            .invoke_function(
                functions::CREATE_SUBSCRIPTION,
                &SubscriptionRequest {
                    payment_id: intent.id,
                    trainer_id,
                    plan,
                    price_id: self.prices.for_plan(plan),
                },
            )
            .await?;

        intent.provider_intent_id = Some(response.provider_intent_id);
        intent.client_secret = response.client_secret.clone();
        self.db
            .from(tables::PAYMENT_INTENTS)?
            .insert::<_, PaymentIntent>(&intent)
            .await?;

        let subscription = Subscription::new(
            trainer_id,
            plan,
            SubscriptionStatus::Incomplete,
            Some(response.provider_subscription_id),
            now,
        );
        self.db
            .from(tables::SUBSCRIPTIONS)?
            .insert::<_, Subscription>(&subscription)
            .await?;

        tracing::info!(trainer_id = %trainer_id, plan = %plan, "Subscription checkout started");
        Ok(SubscriptionCheckout {
            subscription,
            client_secret: response.client_secret,
        })
    }

    async fn cancel_subscription(&self, trainer_id: Uuid) -> Result<Subscription, AppError> {
        let mut sub = self
            .active_subscription(trainer_id)
            .await?
            .ok_or_else(no_active_subscription)?;
        sub.cancel_at_period_end = true;
        sub.updated_at = Utc::now();
        self.db
            .from(tables::SUBSCRIPTIONS)?
            .eq("id", sub.id)
            .update::<_, Subscription>(&serde_json::json!({
                "cancel_at_period_end": true,
                "updated_at": sub.updated_at,
            }))
            .await?;
        Ok(sub)
    }

    async fn create_payment_intent(
        &self,
        trainer_id: Uuid,
        purpose: PaymentPurpose,
    ) -> Result<PaymentIntent, AppError> {
        check_purchase(&purpose)?;
        ledger::fetch_trainer(&self.db, trainer_id).await?;

        let mut intent = PaymentIntent::new(trainer_id, purpose, Utc::now());
        let response: IntentResponse = self
            .db
            .invoke_function(
                functions::CREATE_PAYMENT_INTENT,
                &IntentRequest {
                    payment_id: intent.id,
                    trainer_id,
                    amount_cents: intent.amount_cents,
                    currency: &intent.currency,
                    description: purpose.description(),
                },
            )
            .await?;

        intent.provider_intent_id = Some(response.provider_intent_id);
        intent.client_secret = Some(response.client_secret);
        self.db
            .from(tables::PAYMENT_INTENTS)?
            .insert::<_, PaymentIntent>(&intent)
            .await?;
        Ok(intent)
    }

    async fn get_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError> {
        self.db
            .from(tables::PAYMENT_INTENTS)?
            .eq("id", intent_id)
            .fetch_one()
            .await?
            .ok_or_else(|| payment_not_found(intent_id))
    }

    async fn confirm_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError> {
        let mut intent = self.get_payment(intent_id).await?;
        if !needs_fulfilment(&intent)? {
            return Ok(intent);
        }

        // Only the request that flips the status applies the purchase.
        let now = Utc::now();
        let swapped: Vec<PaymentIntent> = self
            .db
            .from(tables::PAYMENT_INTENTS)?
            .eq("id", intent_id)
            .eq("status", "requires_payment")
            .update(&serde_json::json!({
                "status": "succeeded",
                "updated_at": now,
            }))
            .await?;
        if swapped.is_empty() {
            return self.get_payment(intent_id).await;
        }

        self.fulfil(&intent).await?;
        intent.status = PaymentStatus::Succeeded;
        intent.updated_at = now;
        Ok(intent)
    }

    async fn apply_event(&self, event: PaymentEvent) -> Result<(), AppError> {
        match event {
            PaymentEvent::IntentSucceeded { provider_intent_id } => {
                let intent: Option<PaymentIntent> = self
                    .db
                    .from(tables::PAYMENT_INTENTS)?
                    .eq("provider_intent_id", &provider_intent_id)
                    .fetch_one()
                    .await?;
                match intent {
                    Some(intent) => {
                        self.confirm_payment(intent.id).await?;
                    }
                    None => tracing::warn!(
                        provider_intent_id = %provider_intent_id,
                        "Ignoring event for unknown payment"
                    ),
                }
            }
            PaymentEvent::IntentFailed {
                provider_intent_id,
                reason,
            } => {
                self.db
                    .from(tables::PAYMENT_INTENTS)?
                    .eq("provider_intent_id", &provider_intent_id)
                    .eq("status", "requires_payment")
                    .update::<_, PaymentIntent>(&serde_json::json!({
                        "status": "failed",
                        "failure_reason": reason,
                        "updated_at": Utc::now(),
                    }))
                    .await?;
            }
            PaymentEvent::SubscriptionEnded {
                provider_subscription_id,
            } => {
                let sub: Option<Subscription> = self
                    .db
                    .from(tables::SUBSCRIPTIONS)?
                    .eq("provider_subscription_id", &provider_subscription_id)
                    .neq("status", "canceled")
                    .fetch_one()
                    .await?;
                if let Some(sub) = sub {
                    self.set_subscription_status(sub.id, SubscriptionStatus::Canceled, Utc::now())
                        .await?;
                    if sub.status == SubscriptionStatus::Active {
                        ledger::change_plan_remote(&self.db, sub.trainer_id, PlanTier::Free)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn list_payments(&self, trainer_id: Uuid) -> Result<Vec<PaymentIntent>, AppError> {
        self.db
            .from(tables::PAYMENT_INTENTS)?
            .eq("trainer_id", trainer_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn update_plan(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
    ) -> Result<TrainerProfile, AppError> {
        let trainer = ledger::change_plan_remote(&self.db, trainer_id, plan).await?;
        tracing::info!(trainer_id = %trainer_id, plan = %plan, "Plan updated");
        Ok(trainer)
    }
}
