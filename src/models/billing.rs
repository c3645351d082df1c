// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan tiers, subscriptions and payment intents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::time_utils::billing_period_end;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Currency for every charge.
pub const CURRENCY: &str = "brl";

/// Subscription level controlling student limits and AI credit allotment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Elite,
}

/// Fixed per-tier defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PlanLimits {
    pub max_students: u32,
    pub ai_credits: i64,
    /// Monthly price in cents
    pub price_cents: i64,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Elite];

    pub fn limits(&self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits {
                max_students: 5,
                ai_credits: 10,
                price_cents: 0,
            },
            PlanTier::Pro => PlanLimits {
                max_students: 30,
                ai_credits: 100,
                price_cents: 4990,
            },
            PlanTier::Elite => PlanLimits {
                max_students: 100,
                ai_credits: 500,
                price_cents: 9990,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Elite => "elite",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "elite" => Ok(PlanTier::Elite),
            other => Err(format!("Unknown plan tier: {}", other)),
        }
    }
}

/// One-off AI credit bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum CreditPackage {
    Starter,
    Standard,
    Bulk,
}

impl CreditPackage {
    pub fn credits(&self) -> i64 {
        match self {
            CreditPackage::Starter => 50,
            CreditPackage::Standard => 150,
            CreditPackage::Bulk => 400,
        }
    }

    pub fn price_cents(&self) -> i64 {
        match self {
            CreditPackage::Starter => 1990,
            CreditPackage::Standard => 4990,
            CreditPackage::Bulk => 9990,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Incomplete,
    PastDue,
    Canceled,
}

/// Trainer subscription (`subscriptions` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub provider_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// New subscription with a billing period starting now.
    pub fn new(
        trainer_id: Uuid,
        plan: PlanTier,
        status: SubscriptionStatus,
        provider_subscription_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trainer_id,
            plan,
            status,
            current_period_start: now,
            current_period_end: billing_period_end(now),
            cancel_at_period_end: false,
            provider_subscription_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Canceled at period end and the period is over.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.cancel_at_period_end
            && self.current_period_end <= now
    }
}

/// Result of starting a subscription checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionCheckout {
    pub subscription: Subscription,
    /// Secret the client confirms the first payment with (remote only)
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// What a payment pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentPurpose {
    Subscription { plan: PlanTier },
    Credits { package: CreditPackage },
}

impl PaymentPurpose {
    pub fn amount_cents(&self) -> i64 {
        match self {
            PaymentPurpose::Subscription { plan } => plan.limits().price_cents,
            PaymentPurpose::Credits { package } => package.price_cents(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            PaymentPurpose::Subscription { plan } => format!("{} plan subscription", plan),
            PaymentPurpose::Credits { package } => {
                format!("{} AI credits", package.credits())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPayment,
    Succeeded,
    Failed,
    Canceled,
}

/// Payment intent record (`payment_intents` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub provider_intent_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn new(trainer_id: Uuid, purpose: PaymentPurpose, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trainer_id,
            amount_cents: purpose.amount_cents(),
            currency: CURRENCY.to_string(),
            purpose,
            status: PaymentStatus::RequiresPayment,
            client_secret: None,
            provider_intent_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Provider notifications relevant to billing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    IntentSucceeded {
        provider_intent_id: String,
    },
    IntentFailed {
        provider_intent_id: String,
        reason: String,
    },
    SubscriptionEnded {
        provider_subscription_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_amounts() {
        let sub = PaymentPurpose::Subscription {
            plan: PlanTier::Pro,
        };
        assert_eq!(sub.amount_cents(), 4990);

        let credits = PaymentPurpose::Credits {
            package: CreditPackage::Bulk,
        };
        assert_eq!(credits.amount_cents(), 9990);
        assert_eq!(credits.description(), "400 AI credits");
    }

    #[test]
    fn test_purpose_serializes_tagged() {
        let value = serde_json::to_value(PaymentPurpose::Subscription {
            plan: PlanTier::Elite,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"kind": "subscription", "plan": "elite"}));
    }

    #[test]
    fn test_tiers_are_ordered_by_allowance() {
        let limits: Vec<PlanLimits> = PlanTier::ALL.iter().map(PlanTier::limits).collect();
        assert!(limits.windows(2).all(|w| w[0].max_students < w[1].max_students
            && w[0].ai_credits < w[1].ai_credits));
    }
}
