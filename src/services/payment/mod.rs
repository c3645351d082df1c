// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscriptions, payment intents and plan changes.
//!
//! A payment is fulfilled once: the first confirmation moves the intent to
//! `succeeded` and applies its purpose (plan change or credit purchase).
//! Later confirmations of the same intent return it unchanged.

pub mod local;
pub mod remote;

pub use local::LocalPaymentService;
pub use remote::{PriceIds, RemotePaymentService};

use crate::error::AppError;
use crate::models::{
    PaymentEvent, PaymentIntent, PaymentPurpose, PaymentStatus, PlanTier, Subscription,
    SubscriptionCheckout, TrainerProfile,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Most recent subscription, if any. Lapsed cancellations are ended here.
    async fn get_subscription(&self, trainer_id: Uuid) -> Result<Option<Subscription>, AppError>;

    async fn create_subscription(
        &self,
        trainer_id: Uuid,
        plan: PlanTier,
    ) -> Result<SubscriptionCheckout, AppError>;

    /// Cancel at the end of the current period.
    async fn cancel_subscription(&self, trainer_id: Uuid) -> Result<Subscription, AppError>;

    async fn create_payment_intent(
        &self,
        trainer_id: Uuid,
        purpose: PaymentPurpose,
    ) -> Result<PaymentIntent, AppError>;

    async fn get_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError>;

    async fn confirm_payment(&self, intent_id: Uuid) -> Result<PaymentIntent, AppError>;

    /// Apply a verified provider notification.
    async fn apply_event(&self, event: PaymentEvent) -> Result<(), AppError>;

    async fn list_payments(&self, trainer_id: Uuid) -> Result<Vec<PaymentIntent>, AppError>;

    /// Move a trainer to `plan`, resetting limits and credits.
    async fn update_plan(&self, trainer_id: Uuid, plan: PlanTier)
        -> Result<TrainerProfile, AppError>;
}

pub(crate) fn check_purchase(purpose: &PaymentPurpose) -> Result<(), AppError> {
    match purpose {
        PaymentPurpose::Subscription {
            plan: PlanTier::Free,
        } => Err(AppError::BadRequest(
            "The free plan does not need a payment".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Whether an intent still needs fulfilment.
///
/// Succeeded intents are already done; failed or canceled ones can never be.
pub(crate) fn needs_fulfilment(intent: &PaymentIntent) -> Result<bool, AppError> {
    match intent.status {
        PaymentStatus::RequiresPayment => Ok(true),
        PaymentStatus::Succeeded => Ok(false),
        PaymentStatus::Failed | PaymentStatus::Canceled => Err(AppError::Conflict(format!(
            "Payment {} can no longer be confirmed",
            intent.id
        ))),
    }
}

pub(crate) fn payment_not_found(intent_id: Uuid) -> AppError {
    AppError::NotFound(format!("Payment {} not found", intent_id))
}

pub(crate) fn no_active_subscription() -> AppError {
    AppError::NotFound("No active subscription".to_string())
}
