// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI-generated plans paid for with trainer credits.
//!
//! Generation follows the same steps on both backends:
//! 1. Check the balance covers the feature cost (no mutation on failure)
//! 2. Generate the content
//! 3. Atomically re-check and deduct, appending one usage entry, and store
//!    the generated plan

pub mod generator;
pub mod local;
pub mod remote;

pub use generator::{ContentGenerator, OpenAiGenerator, TemplateGenerator};
pub use local::LocalAiService;
pub use remote::RemoteAiService;

use crate::error::AppError;
use crate::models::{
    CreditBalance, CreditTransaction, DietPlanDetail, DietPlanRequest, Exercise, Generated,
    GeneratedWorkout, NewDietPlan, NewExercise, NewPlanExercise, NewWorkoutPlan,
    TransactionKind, WorkoutPlanDetail, WorkoutPlanRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Most ledger entries returned by one listing.
pub const MAX_TRANSACTIONS: usize = 200;

#[async_trait]
pub trait AiService: Send + Sync {
    async fn get_credits(&self, trainer_id: Uuid) -> Result<CreditBalance, AppError>;

    /// Newest ledger entries first.
    async fn list_transactions(
        &self,
        trainer_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, AppError>;

    async fn generate_diet_plan(
        &self,
        trainer_id: Uuid,
        request: DietPlanRequest,
    ) -> Result<Generated<DietPlanDetail>, AppError>;

    async fn generate_workout_plan(
        &self,
        trainer_id: Uuid,
        request: WorkoutPlanRequest,
    ) -> Result<Generated<WorkoutPlanDetail>, AppError>;

    /// Credit (or debit) the balance outside of feature use.
    async fn add_credits(
        &self,
        trainer_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        description: &str,
    ) -> Result<CreditTransaction, AppError>;
}

pub(crate) fn check_adjustment(amount: i64) -> Result<(), AppError> {
    if amount == 0 {
        return Err(AppError::BadRequest(
            "Credit adjustment must be non-zero".to_string(),
        ));
    }
    Ok(())
}

/// Reject generator output that would not pass as a hand-written plan.
pub(crate) fn check_generated<T: Validate>(content: &T) -> Result<(), AppError> {
    content.validate().map_err(|e| {
        tracing::warn!(error = %e, "Generated content failed validation");
        AppError::Backend("Generated content was malformed".to_string())
    })
}

/// Apply the caller's choices on top of generated diet content.
pub(crate) fn finish_diet_plan(mut plan: NewDietPlan, request: &DietPlanRequest) -> NewDietPlan {
    if let Some(name) = &request.name {
        plan.name = name.clone();
    }
    plan.student_id = request.student_id;
    plan.goal = Some(request.goal.clone());
    if request.target_calories.is_some() {
        plan.target_calories = request.target_calories;
    }
    plan
}

/// Map generated exercises onto catalog entries by name.
///
/// Returns the plan and any catalog entries that had to be created.
pub(crate) fn resolve_workout(
    generated: GeneratedWorkout,
    request: &WorkoutPlanRequest,
    catalog: &[Exercise],
    created_by: Uuid,
    now: DateTime<Utc>,
) -> (NewWorkoutPlan, Vec<Exercise>) {
    let mut created: Vec<Exercise> = Vec::new();
    let mut exercises = Vec::with_capacity(generated.exercises.len());

    for g in generated.exercises {
        let known = catalog
            .iter()
            .chain(created.iter())
            .find(|e| e.name.eq_ignore_ascii_case(&g.name))
            .map(|e| e.id);
        let exercise_id = match known {
            Some(id) => id,
            None => {
                let exercise = NewExercise {
                    name: g.name.clone(),
                    muscle_group: g.muscle_group.clone(),
                    equipment: None,
                    instructions: None,
                    video_url: None,
                }
                .into_exercise(Some(created_by), now);
                let id = exercise.id;
                created.push(exercise);
                id
            }
        };

        exercises.push(NewPlanExercise {
            exercise_id,
            day_of_week: g.day_of_week,
            sets: g.sets,
            reps: g.reps,
            rest_seconds: g.rest_seconds,
            weight_kg: None,
            notes: g.notes,
        });
    }

    let plan = NewWorkoutPlan {
        name: request.name.clone().unwrap_or(generated.name),
        description: generated.description,
        goal: Some(request.goal.clone()),
        student_id: request.student_id,
        is_template: false,
        starts_on: None,
        ends_on: None,
        exercises,
    };
    (plan, created)
}
