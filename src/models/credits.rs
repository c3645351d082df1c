// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

use crate::models::billing::PlanTier;

/// AI features with a fixed per-use credit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum AiFeature {
    DietPlan,
    WorkoutPlan,
}

impl AiFeature {
    pub fn cost(&self) -> i64 {
        match self {
            AiFeature::DietPlan => 5,
            AiFeature::WorkoutPlan => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AiFeature::DietPlan => "AI diet plan",
            AiFeature::WorkoutPlan => "AI workout plan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Spent on an AI feature
    Usage,
    /// Bought as a credit package
    Purchase,
    /// Balance set by a plan change
    PlanReset,
    /// Returned after a failed generation
    Refund,
}

/// Current balance and the plan it was allotted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreditBalance {
    pub trainer_id: Uuid,
    pub plan: PlanTier,
    pub balance: i64,
}

/// Signed ledger entry (`credit_transactions` table). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    #[serde(default)]
    pub feature: Option<AiFeature>,
    pub description: String,
    /// Trainer balance right after this entry
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn new(
        trainer_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        feature: Option<AiFeature>,
        description: impl Into<String>,
        balance_after: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trainer_id,
            amount,
            kind,
            feature,
            description: description.into(),
            balance_after,
            created_at: Utc::now(),
        }
    }
}
