// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog, workout plans and diet plans.

pub mod local;
pub mod remote;

pub use local::LocalWorkoutService;
pub use remote::RemoteWorkoutService;

use crate::error::AppError;
use crate::models::{
    DietPlan, DietPlanDetail, Exercise, NewDietPlan, NewExercise, NewWorkoutPlan, WorkoutPlan,
    WorkoutPlanDetail,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
pub trait WorkoutService: Send + Sync {
    // ─── Exercises ────────────────────────────────────────────────

    async fn list_exercises(&self) -> Result<Vec<Exercise>, AppError>;

    async fn create_exercise(
        &self,
        created_by: Uuid,
        exercise: NewExercise,
    ) -> Result<Exercise, AppError>;

    // ─── Workout Plans ────────────────────────────────────────────

    async fn list_workout_plans(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError>;

    async fn list_student_workout_plans(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<WorkoutPlan>, AppError>;

    async fn list_templates(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError>;

    async fn get_workout_plan(&self, plan_id: Uuid) -> Result<WorkoutPlanDetail, AppError>;

    async fn create_workout_plan(
        &self,
        trainer_id: Uuid,
        plan: NewWorkoutPlan,
    ) -> Result<WorkoutPlanDetail, AppError>;

    async fn delete_workout_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError>;

    /// Copy a template into a new plan for a linked student.
    ///
    /// The copy is not a template and gets new ids; the template is unchanged.
    async fn assign_template(
        &self,
        trainer_id: Uuid,
        template_id: Uuid,
        student_id: Uuid,
    ) -> Result<WorkoutPlanDetail, AppError>;

    // ─── Diet Plans ───────────────────────────────────────────────

    async fn list_diet_plans(&self, trainer_id: Uuid) -> Result<Vec<DietPlan>, AppError>;

    async fn list_student_diet_plans(&self, student_id: Uuid)
        -> Result<Vec<DietPlan>, AppError>;

    async fn get_diet_plan(&self, plan_id: Uuid) -> Result<DietPlanDetail, AppError>;

    async fn create_diet_plan(
        &self,
        trainer_id: Uuid,
        plan: NewDietPlan,
    ) -> Result<DietPlanDetail, AppError>;

    async fn delete_diet_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError>;
}

/// Templates are reusable and never belong to a student.
pub(crate) fn check_new_workout_plan(plan: &NewWorkoutPlan) -> Result<(), AppError> {
    if plan.is_template && plan.student_id.is_some() {
        return Err(AppError::BadRequest(
            "A template cannot be assigned to a student".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (plan.starts_on, plan.ends_on) {
        if end < start {
            return Err(AppError::BadRequest(
                "Plan end date is before its start date".to_string(),
            ));
        }
    }
    Ok(())
}

/// Distinct exercise ids referenced by a new plan.
pub(crate) fn referenced_exercises(plan: &NewWorkoutPlan) -> BTreeSet<Uuid> {
    plan.exercises.iter().map(|e| e.exercise_id).collect()
}

pub(crate) fn unknown_exercise(id: Uuid) -> AppError {
    AppError::BadRequest(format!("Unknown exercise {}", id))
}

pub(crate) fn plan_not_found(plan_id: Uuid) -> AppError {
    AppError::NotFound(format!("Plan {} not found", plan_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPlanExercise;
    use chrono::NaiveDate;

    fn plan(is_template: bool, student_id: Option<Uuid>) -> NewWorkoutPlan {
        NewWorkoutPlan {
            name: "Push".to_string(),
            description: None,
            goal: None,
            student_id,
            is_template,
            starts_on: None,
            ends_on: None,
            exercises: vec![],
        }
    }

    #[test]
    fn test_template_with_student_is_rejected() {
        assert!(check_new_workout_plan(&plan(true, None)).is_ok());
        assert!(check_new_workout_plan(&plan(false, Some(Uuid::new_v4()))).is_ok());
        assert!(matches!(
            check_new_workout_plan(&plan(true, Some(Uuid::new_v4()))),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_reversed_dates_are_rejected() {
        let mut p = plan(false, None);
        p.starts_on = NaiveDate::from_ymd_opt(2026, 6, 1);
        p.ends_on = NaiveDate::from_ymd_opt(2026, 5, 1);
        assert!(check_new_workout_plan(&p).is_err());
    }

    #[test]
    fn test_referenced_exercises_are_distinct() {
        let squat = Uuid::new_v4();
        let mut p = plan(false, None);
        for _ in 0..3 {
            p.exercises.push(NewPlanExercise {
                exercise_id: squat,
                day_of_week: None,
                sets: 3,
                reps: "10".to_string(),
                rest_seconds: 60,
                weight_kg: None,
                notes: None,
            });
        }
        assert_eq!(referenced_exercises(&p).len(), 1);
    }
}
