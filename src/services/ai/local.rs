// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::generator::ContentGenerator;
use super::{check_adjustment, check_generated, finish_diet_plan, resolve_workout, AiService};
use crate::db::LocalStore;
use crate::error::AppError;
use crate::models::{
    AiFeature, CreditBalance, CreditTransaction, DietPlanDetail, DietPlanRequest, Generated,
    TransactionKind, WorkoutPlanDetail, WorkoutPlanRequest,
};
use crate::services::ledger::{self, CreditChange};
use crate::services::workout::local::{check_plan_student, insert_diet_plan, insert_workout_plan};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalAiService {
    store: Arc<LocalStore>,
    generator: Arc<dyn ContentGenerator>,
}

impl LocalAiService {
    pub fn new(store: Arc<LocalStore>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self { store, generator }
    }

    /// Fail before generating when the trainer cannot pay for `feature`.
    async fn precheck(
        &self,
        trainer_id: Uuid,
        student_id: Option<Uuid>,
        feature: AiFeature,
    ) -> Result<(), AppError> {
        let db = self.store.read().await?;
        let trainer = db
            .trainer(trainer_id)
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))?;
        ledger::check_affordable(trainer, feature)?;
        check_plan_student(&db, trainer_id, student_id)
    }
}

#[async_trait]
impl AiService for LocalAiService {
    async fn get_credits(&self, trainer_id: Uuid) -> Result<CreditBalance, AppError> {
        let db = self.store.read().await?;
        let trainer = db
            .trainer(trainer_id)
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))?;
        Ok(CreditBalance {
            trainer_id,
            plan: trainer.plan,
            balance: trainer.ai_credits,
        })
    }

    async fn list_transactions(
        &self,
        trainer_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, AppError> {
        let db = self.store.read().await?;
        let mut transactions: Vec<CreditTransaction> = db
            .credit_transactions
            .into_iter()
            .filter(|t| t.trainer_id == trainer_id)
            .collect();
        transactions.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn generate_diet_plan(
        &self,
        trainer_id: Uuid,
        request: DietPlanRequest,
    ) -> Result<Generated<DietPlanDetail>, AppError> {
        let feature = AiFeature::DietPlan;
        self.precheck(trainer_id, request.student_id, feature).await?;

        let content = self.generator.diet_plan(&request).await?;
        let content = finish_diet_plan(content, &request);
        check_generated(&content)?;

        let generated = self
            .store
            .update(|db| {
                check_plan_student(db, trainer_id, request.student_id)?;
                let transaction = ledger::apply_local(db, trainer_id, CreditChange::usage(feature))?;
                let detail = DietPlanDetail::build(trainer_id, content, true, Utc::now());
                insert_diet_plan(db, &detail);
                Ok(Generated {
                    artifact: detail,
                    balance: transaction.balance_after,
                    transaction,
                })
            })
            .await?;

        tracing::info!(
            trainer_id = %trainer_id,
            generator = self.generator.name(),
            plan_id = %generated.artifact.plan.id,
            balance = generated.balance,
            "Generated diet plan"
        );
        Ok(generated)
    }

    async fn generate_workout_plan(
        &self,
        trainer_id: Uuid,
        request: WorkoutPlanRequest,
    ) -> Result<Generated<WorkoutPlanDetail>, AppError> {
        let feature = AiFeature::WorkoutPlan;
        self.precheck(trainer_id, request.student_id, feature).await?;

        let content = self.generator.workout_plan(&request).await?;
        check_generated(&content)?;

        let generated = self
            .store
            .update(|db| {
                check_plan_student(db, trainer_id, request.student_id)?;
                let transaction = ledger::apply_local(db, trainer_id, CreditChange::usage(feature))?;

                let now = Utc::now();
                let (plan, created) =
                    resolve_workout(content, &request, &db.exercises, trainer_id, now);
                db.exercises.extend(created);

                let detail = WorkoutPlanDetail::build(trainer_id, plan, true, now);
                insert_workout_plan(db, &detail);
                Ok(Generated {
                    artifact: detail,
                    balance: transaction.balance_after,
                    transaction,
                })
            })
            .await?;

        tracing::info!(
            trainer_id = %trainer_id,
            generator = self.generator.name(),
            plan_id = %generated.artifact.plan.id,
            balance = generated.balance,
            "Generated workout plan"
        );
        Ok(generated)
    }

    async fn add_credits(
        &self,
        trainer_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<CreditTransaction, AppError> {
        check_adjustment(amount)?;
        let change = CreditChange::grant(amount, kind, description);
        self.store
            .update(|db| ledger::apply_local(db, trainer_id, change))
            .await
    }
}
