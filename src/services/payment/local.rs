// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local billing: no payment provider, payments succeed on confirmation.

use super::{
    check_purchase, needs_fulfilment, no_active_subscription, payment_not_found, PaymentService,
};
use crate::db::{LocalDatabase, LocalStore};
use crate::error::AppError;
use crate::models::{
    PaymentEvent, PaymentIntent, PaymentPurpose, PaymentStatus, PlanTier, Subscription,
    SubscriptionCheckout, SubscriptionStatus, TrainerProfile, TransactionKind,
};
use crate::services::ledger::{self, CreditChange};
use crate::time_utils::billing_period_end;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalPaymentService {
    store: Arc<LocalStore>,
}

impl LocalPaymentService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

fn provider_id(prefix: &str) -> String {
    format!("{}_local_{}", prefix, Uuid::new_v4().simple())
}

fn latest_subscription(db: &LocalDatabase, trainer_id: Uuid) -> Option<&Subscription> {
    db.subscriptions
        .iter()
        .filter(|s| s.trainer_id == trainer_id)
        .max_by_key(|s| s.created_at)
}

fn active_subscription_mut(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
) -> Option<&mut Subscription> {
    db.subscriptions
        .iter_mut()
        .filter(|s| s.trainer_id == trainer_id && s.status == SubscriptionStatus::Active)
        .max_by_key(|s| s.created_at)
}

/// Current subscription, ending it first if it was cancelled and its
/// period is over.
fn settle_subscription(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>, AppError> {
    let Some(latest) = latest_subscription(db, trainer_id) else {
        return Ok(None);
    };
    if !latest.has_lapsed(now) {
        return Ok(Some(latest.clone()));
    }
    let lapsed = latest.id;

    let sub = db
        .subscriptions
        .iter_mut()
        .find(|s| s.id == lapsed)
        .ok_or_else(no_active_subscription)?;
    sub.status = SubscriptionStatus::Canceled;
    sub.updated_at = now;
    let sub = sub.clone();
    ledger::change_plan_local(db, trainer_id, PlanTier::Free)?;
    tracing::info!(trainer_id = %trainer_id, plan = %sub.plan, "Subscription lapsed");
    Ok(Some(sub))
}

/// End any active subscription other than `keep`.
fn end_other_subscriptions(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    keep: Option<Uuid>,
    now: DateTime<Utc>,
) {
    for sub in db.subscriptions.iter_mut().filter(|s| {
        s.trainer_id == trainer_id
            && s.status == SubscriptionStatus::Active
            && Some(s.id) != keep
    }) {
        sub.status = SubscriptionStatus::Canceled;
        sub.updated_at = now;
    }
}

/// Make `plan` the trainer's active subscription and apply its limits.
///
/// A pending subscription for the same plan is activated, otherwise a new
/// one is created.
fn activate_subscription(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    plan: PlanTier,
    now: DateTime<Utc>,
) -> Result<Subscription, AppError> {
    let pending = db.subscriptions.iter_mut().find(|s| {
        s.trainer_id == trainer_id
            && s.plan == plan
            && s.status == SubscriptionStatus::Incomplete
    });
    let subscription = match pending {
        Some(sub) => {
            sub.status = SubscriptionStatus::Active;
            sub.current_period_start = now;
            sub.current_period_end = billing_period_end(now);
            sub.updated_at = now;
            sub.clone()
        }
        None => {
            let sub = Subscription::new(
                trainer_id,
                plan,
                SubscriptionStatus::Active,
                Some(provider_id("sub")),
                now,
            );
            db.subscriptions.push(sub.clone());
            sub
        }
    };

    end_other_subscriptions(db, trainer_id, Some(subscription.id), now);
    ledger::change_plan_local(db, trainer_id, plan)?;
    Ok(subscription)
}

/// Move a pending intent to succeeded and apply what it paid for.
fn fulfil(db: &mut LocalDatabase, intent_id: Uuid) -> Result<PaymentIntent, AppError> {
    let now = Utc::now();
    let intent = db
        .payment_intents
        .iter_mut()
        .find(|p| p.id == intent_id)
        .ok_or_else(|| payment_not_found(intent_id))?;
    if !needs_fulfilment(intent)? {
        return Ok(intent.clone());
    }
    intent.status = PaymentStatus::Succeeded;
    intent.updated_at = now;
    let intent = intent.clone();

    match intent.purpose {
        PaymentPurpose::Subscription { plan } => {
            activate_subscription(db, intent.trainer_id, plan, now)?;
        }
        PaymentPurpose::Credits { package } => {
            ledger::apply_local(
                db,
                intent.trainer_id,
                CreditChange::grant(
                    package.credits(),
                    TransactionKind::Purchase,
                    intent.purpose.description(),
                ),
            )?;
        }
    }

    tracing::info!(
        payment_id = %intent.id,
        trainer_id = %intent.trainer_id,
        amount_cents = intent.amount_cents,
        "Payment fulfilled"
    );
    Ok(intent)
}

#[async_trait]
impl PaymentService for LocalPaymentService {
    async fn get_subscription(&self, trainer_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let now = Utc::now();
        let db = self.store.read().await?;
        match latest_subscription(&db, trainer_id) {
            None => return Ok(None),
            Some(sub) if !sub.has_lapsed(now) => return Ok(Some(sub.clone())),
            Some(_) => {}
        }

        // The snapshot may be stale by now; decide again under the lock.
        self.store
            .update(|db| settle_subscription(db, trainer_id, now))
            .await
    }

    async fn create_subscription(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
    ) -> Result<SubscriptionCheckout, AppError> {
        let purpose = PaymentPurpose::Subscription { plan };
        check_purchase(&purpose)?;

        let subscription = self
            .store
            .update(|db| {
                if db.trainer(trainer_id).is_none() {
                    return Err(AppError::NotFound(format!("Trainer {} not found", trainer_id)));
                }
                if let Some(active) = active_subscription_mut(db, trainer_id) {
                    if active.plan == plan {
                        return Err(AppError::Conflict(format!(
                            "Already subscribed to the {} plan",
                            plan
                        )));
                    }
                }

                // Keep a record of the charge alongside other payments.
                let now = Utc::now();
                let mut intent = PaymentIntent::new(trainer_id, purpose, now);
                intent.provider_intent_id = Some(provider_id("pi"));
                let intent_id = intent.id;
                db.payment_intents.push(intent);
                fulfil(db, intent_id)?;

                latest_subscription(db, trainer_id)
                    .cloned()
                    .ok_or_else(no_active_subscription)
            })
            .await?;

        tracing::info!(trainer_id = %trainer_id, plan = %plan, "Subscription created");
        Ok(SubscriptionCheckout {
            subscription,
            client_secret: None,
        })
    }

    async fn cancel_subscription(&self, trainer_id: Uuid) -> Result<Subscription, AppError> {
        self.store
            .update(|db| {
                let sub =
                    active_subscription_mut(db, trainer_id).ok_or_else(no_active_subscription)?;
                sub.cancel_at_period_end = true;
                sub.updated_at = Utc::now();
                Ok(sub.clone())
            })
            .await
    }

    async fn create_payment_intent(
        &self,
        trainer_id: Uuid,
        purpose: PaymentPurpose,
    ) -> Result<PaymentIntent, AppError> {
        check_purchase(&purpose)?;
        self.store
            .update(|db| {
                if db.trainer(trainer_id).is_none() {
                    return Err(AppError::NotFound(format!("Trainer {} not found", trainer_id)));
                }
                let mut intent = PaymentIntent::new(trainer_id, purpose, Utc::now());
                let provider_intent_id = provider_id("pi");
                intent.client_secret = Some(format!(
                    "{}_secret_{}",
                    provider_intent_id,
                    Uuid::new_v4().simple()
                ));
                intent.provider_intent_id = Some(provider_intent_id);
                db.payment_intents.push(intent.clone());
                Ok(intent)
            })
            .await
    }

    async fn get_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError> {
        let db = self.store.read().await?;
        db.payment_intents
            .into_iter()
            .find(|p| p.id == intent_id)
            .ok_or_else(|| payment_not_found(intent_id))
    }

    async fn confirm_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError> {
        self.store.update(|db| fulfil(db, intent_id)).await
    }

    async fn apply_event(&self, event: PaymentEvent) -> Result<(), AppError> {
        self.store
            .update(|db| {
                match event {
                    PaymentEvent::IntentSucceeded { provider_intent_id } => {
                        let found = db
                            .payment_intents
                            .iter()
                            .find(|p| {
                                p.provider_intent_id.as_deref() == Some(provider_intent_id.as_str())
                            })
                            .map(|p| p.id);
                        match found {
                            Some(id) => {
                                fulfil(db, id)?;
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
                        if let Some(intent) = db.payment_intents.iter_mut().find(|p| {
                            p.provider_intent_id.as_deref() == Some(provider_intent_id.as_str())
                                && p.status == PaymentStatus::RequiresPayment
                        }) {
                            intent.status = PaymentStatus::Failed;
                            intent.failure_reason = Some(reason);
                            intent.updated_at = Utc::now();
                        }
                    }
                    PaymentEvent::SubscriptionEnded {
                        provider_subscription_id,
                    } => {
                        let ended = db.subscriptions.iter_mut().find(|s| {
                            s.provider_subscription_id.as_deref()
                                == Some(provider_subscription_id.as_str())
                                && s.status != SubscriptionStatus::Canceled
                        });
                        if let Some(sub) = ended {
                            let was_active = sub.status == SubscriptionStatus::Active;
                            sub.status = SubscriptionStatus::Canceled;
                            sub.updated_at = Utc::now();
                            let trainer_id = sub.trainer_id;
                            if was_active {
                                ledger::change_plan_local(db, trainer_id, PlanTier::Free)?;
                            }
                        }
                    }
                }
                Ok(())
            })
            .await
    }

    async fn list_payments(&self, trainer_id: Uuid) -> Result<Vec<PaymentIntent>, AppError> {
        let db = self.store.read().await?;
        let mut payments: Vec<PaymentIntent> = db
            .payment_intents
            .into_iter()
            .filter(|p| p.trainer_id == trainer_id)
            .collect();
        payments.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(payments)
    }

    async fn update_plan(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
    ) -> Result<TrainerProfile, AppError> {
        let trainer = self
            .store
            .update(|db| ledger::change_plan_local(db, trainer_id, plan))
            .await?;
        tracing::info!(trainer_id = %trainer_id, plan = %plan, "Plan updated");
        Ok(trainer)
    }
}
