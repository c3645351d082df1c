// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::generator::ContentGenerator;
use super::{check_adjustment, check_generated, finish_diet_plan, resolve_workout, AiService};
use crate::db::{tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    AiFeature, CreditBalance, CreditTransaction, DietPlanDetail, DietPlanRequest, Exercise,
    Generated, TransactionKind, WorkoutPlanDetail, WorkoutPlanRequest,
};
use crate::services::ledger::{self, CreditChange};
use crate::services::workout::remote::{check_plan_student, insert_diet_plan, insert_workout_plan};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct RemoteAiService {
    db: RemoteDb,
    generator: Arc<dyn ContentGenerator>,
}

impl RemoteAiService {
    pub fn new(db: RemoteDb, generator: Arc<dyn ContentGenerator>) -> Self {
        Self { db, generator }
    }

    async fn precheck(
        &self,
        trainer_id: Uuid,
        student_id: Option<Uuid>,
        feature: AiFeature,
    ) -> Result<(), AppError> {
        let trainer = ledger::fetch_trainer(&self.db, trainer_id).await?;
        ledger::check_affordable(&trainer, feature)?;
        check_plan_student(&self.db, trainer_id, student_id).await
    }

    /// Give the credits back after the artifact could not be stored.
    async fn refund(&self, trainer_id: Uuid, feature: AiFeature, cause: &AppError) {
        tracing::warn!(
            trainer_id = %trainer_id,
            feature = feature.label(),
            error = %cause,
            "Storing generated plan failed, refunding credits"
        );
        if let Err(e) = ledger::apply_remote(&self.db, trainer_id, CreditChange::refund(feature)).await
        {
            tracing::error!(
                trainer_id = %trainer_id,
                feature = feature.label(),
                error = %e,
                "Credit refund failed"
            );
        }
    }
}

#[async_trait]
impl AiService for RemoteAiService {
    async fn get_credits(&self, trainer_id: Uuid) -> Result<CreditBalance, AppError> {
        let trainer = ledger::fetch_trainer(&self.db, trainer_id).await?;
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
        self.db
            .from(tables::CREDIT_TRANSACTIONS)?
            .eq("trainer_id", trainer_id)
            .order("created_at", false)
            .limit(u32::try_from(limit).unwrap_or(u32::MAX))
            .fetch()
            .await
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

        let transaction =
            ledger::apply_remote(&self.db, trainer_id, CreditChange::usage(feature)).await?;
        let detail = DietPlanDetail::build(trainer_id, content, true, Utc::now());
        if let Err(e) = insert_diet_plan(&self.db, &detail).await {
            self.refund(trainer_id, feature, &e).await;
            return Err(e);
        }

        tracing::info!(
            trainer_id = %trainer_id,
            generator = self.generator.name(),
            plan_id = %detail.plan.id,
            balance = transaction.balance_after,
            "Generated diet plan"
        );
        Ok(Generated {
            artifact: detail,
            balance: transaction.balance_after,
            transaction,
        })
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

        let catalog: Vec<Exercise> = self.db.from(tables::EXERCISES)?.fetch().await?;
        let now = Utc::now();
        let (plan, created) = resolve_workout(content, &request, &catalog, trainer_id, now);
        if !created.is_empty() {
            self.db
                .from(tables::EXERCISES)?
                .insert::<_, Exercise>(&created)
                .await?;
        }

        let transaction =
            ledger::apply_remote(&self.db, trainer_id, CreditChange::usage(feature)).await?;
        let detail = WorkoutPlanDetail::build(trainer_id, plan, true, now);
        if let Err(e) = insert_workout_plan(&self.db, &detail).await {
            self.refund(trainer_id, feature, &e).await;
            return Err(e);
        }

        tracing::info!(
            trainer_id = %trainer_id,
            generator = self.generator.name(),
            plan_id = %detail.plan.id,
            balance = transaction.balance_after,
            "Generated workout plan"
        );
        Ok(Generated {
            artifact: detail,
            balance: transaction.balance_after,
            transaction,
        })
    }

    async fn add_credits(
        &self,
        trainer_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<CreditTransaction, AppError> {
        check_adjustment(amount)?;
        ledger::apply_remote(
            &self.db,
            trainer_id,
            CreditChange::grant(amount, kind, description),
        )
        .await
    }
}
