// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{
    check_new_workout_plan, plan_not_found, referenced_exercises, unknown_exercise,
    WorkoutService,
};
use crate::db::{LocalDatabase, LocalStore};
use crate::error::AppError;
use crate::models::{
    DietPlan, DietPlanDetail, Exercise, NewDietPlan, NewExercise, NewWorkoutPlan, WorkoutPlan,
    WorkoutPlanDetail,
};
use crate::services::trainer::not_linked;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalWorkoutService {
    store: Arc<LocalStore>,
}

impl LocalWorkoutService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

fn newest_first<T>(mut plans: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    plans.sort_by_key(|p| std::cmp::Reverse(created_at(p)));
    plans
}

/// Append a plan and its exercise rows.
pub(crate) fn insert_workout_plan(db: &mut LocalDatabase, detail: &WorkoutPlanDetail) {
    db.workout_plans.push(detail.plan.clone());
    db.workout_plan_exercises
        .extend(detail.exercises.iter().cloned());
}

/// Append a diet plan with its meals and ingredients.
pub(crate) fn insert_diet_plan(db: &mut LocalDatabase, detail: &DietPlanDetail) {
    let (plan, meals, ingredients) = detail.clone().into_rows();
    db.diet_plans.push(plan);
    db.meals.extend(meals);
    db.ingredients.extend(ingredients);
}

/// Validate ownership-related fields of a new plan against the document.
pub(crate) fn check_plan_student(
    db: &LocalDatabase,
    trainer_id: Uuid,
    student_id: Option<Uuid>,
) -> Result<(), AppError> {
    match student_id {
        Some(student_id) if !db.is_linked(trainer_id, student_id) => Err(not_linked(student_id)),
        _ => Ok(()),
    }
}

fn workout_detail(db: &LocalDatabase, plan_id: Uuid) -> Result<WorkoutPlanDetail, AppError> {
    let plan = db
        .workout_plans
        .iter()
        .find(|p| p.id == plan_id)
        .cloned()
        .ok_or_else(|| plan_not_found(plan_id))?;
    let mut exercises: Vec<_> = db
        .workout_plan_exercises
        .iter()
        .filter(|e| e.workout_plan_id == plan_id)
        .cloned()
        .collect();
    exercises.sort_by_key(|e| e.position);
    Ok(WorkoutPlanDetail { plan, exercises })
}

/// Remove a workout plan and its exercise rows.
pub(crate) fn remove_workout_plan(db: &mut LocalDatabase, plan_id: Uuid) {
    db.workout_plans.retain(|p| p.id != plan_id);
    db.workout_plan_exercises
        .retain(|e| e.workout_plan_id != plan_id);
}

/// Remove a diet plan and everything below it.
pub(crate) fn remove_diet_plan(db: &mut LocalDatabase, plan_id: Uuid) {
    let meal_ids: Vec<Uuid> = db
        .meals
        .iter()
        .filter(|m| m.diet_plan_id == plan_id)
        .map(|m| m.id)
        .collect();
    db.ingredients.retain(|i| !meal_ids.contains(&i.meal_id));
    db.meals.retain(|m| m.diet_plan_id != plan_id);
    db.diet_plans.retain(|p| p.id != plan_id);
}

#[async_trait]
impl WorkoutService for LocalWorkoutService {
    async fn list_exercises(&self) -> Result<Vec<Exercise>, AppError> {
        let mut exercises = self.store.read().await?.exercises;
        exercises.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(exercises)
    }

    async fn create_exercise(
        &self,
        created_by: Uuid,
        exercise: NewExercise,
    ) -> Result<Exercise, AppError> {
        self.store
            .update(|db| {
                if db
                    .exercises
                    .iter()
                    .any(|e| e.name.eq_ignore_ascii_case(&exercise.name))
                {
                    return Err(AppError::Conflict(format!(
                        "Exercise {} already exists",
                        exercise.name
                    )));
                }
                let created = exercise.into_exercise(Some(created_by), Utc::now());
                db.exercises.push(created.clone());
                Ok(created)
            })
            .await
    }

    async fn list_workout_plans(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError> {
        let db = self.store.read().await?;
        let plans: Vec<WorkoutPlan> = db
            .workout_plans
            .into_iter()
            .filter(|p| p.trainer_id == trainer_id)
            .collect();
        Ok(newest_first(plans, |p| p.created_at))
    }

    async fn list_student_workout_plans(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<WorkoutPlan>, AppError> {
        let db = self.store.read().await?;
        let plans: Vec<WorkoutPlan> = db
            .workout_plans
            .into_iter()
            .filter(|p| p.student_id == Some(student_id))
            .collect();
        Ok(newest_first(plans, |p| p.created_at))
    }

    async fn list_templates(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError> {
        let db = self.store.read().await?;
        let plans: Vec<WorkoutPlan> = db
            .workout_plans
            .into_iter()
            .filter(|p| p.trainer_id == trainer_id && p.is_template)
            .collect();
        Ok(newest_first(plans, |p| p.created_at))
    }

    async fn get_workout_plan(&self, plan_id: Uuid) -> Result<WorkoutPlanDetail, AppError> {
        let db = self.store.read().await?;
        workout_detail(&db, plan_id)
    }

    async fn create_workout_plan(
        &self,
        trainer_id: Uuid,
        plan: NewWorkoutPlan,
    ) -> Result<WorkoutPlanDetail, AppError> {
        check_new_workout_plan(&plan)?;
        self.store
            .update(|db| {
                check_plan_student(db, trainer_id, plan.student_id)?;
                if let Some(missing) = referenced_exercises(&plan)
                    .into_iter()
                    .find(|id| !db.exercises.iter().any(|e| e.id == *id))
                {
                    return Err(unknown_exercise(missing));
                }

                let detail = WorkoutPlanDetail::build(trainer_id, plan, false, Utc::now());
                insert_workout_plan(db, &detail);
                Ok(detail)
            })
            .await
    }

    async fn delete_workout_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError> {
        self.store
            .update(|db| {
                if !db
                    .workout_plans
                    .iter()
                    .any(|p| p.id == plan_id && p.trainer_id == trainer_id)
                {
                    return Err(plan_not_found(plan_id));
                }
                remove_workout_plan(db, plan_id);
                Ok(())
            })
            .await
    }

    async fn assign_template(
        &self,
        trainer_id: Uuid,
        template_id: Uuid,
        student_id: Uuid,
    ) -> Result<WorkoutPlanDetail, AppError> {
        let copy = self
            .store
            .update(|db| {
                let template = workout_detail(db, template_id)?;
                if template.plan.trainer_id != trainer_id {
                    return Err(plan_not_found(template_id));
                }
                if !template.plan.is_template {
                    return Err(AppError::BadRequest(format!(
                        "Plan {} is not a template",
                        template_id
                    )));
                }
                check_plan_student(db, trainer_id, Some(student_id))?;

                let copy = template.instantiate_for(student_id, Utc::now());
                insert_workout_plan(db, &copy);
                Ok(copy)
            })
            .await?;

        tracing::info!(
            template_id = %template_id,
            plan_id = %copy.plan.id,
            student_id = %student_id,
            "Template assigned"
        );
        Ok(copy)
    }

    async fn list_diet_plans(&self, trainer_id: Uuid) -> Result<Vec<DietPlan>, AppError> {
        let db = self.store.read().await?;
        let plans: Vec<DietPlan> = db
            .diet_plans
            .into_iter()
            .filter(|p| p.trainer_id == trainer_id)
            .collect();
        Ok(newest_first(plans, |p| p.created_at))
    }

    async fn list_student_diet_plans(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<DietPlan>, AppError> {
        let db = self.store.read().await?;
        let plans: Vec<DietPlan> = db
            .diet_plans
            .into_iter()
            .filter(|p| p.student_id == Some(student_id))
            .collect();
        Ok(newest_first(plans, |p| p.created_at))
    }

    async fn get_diet_plan(&self, plan_id: Uuid) -> Result<DietPlanDetail, AppError> {
        let db = self.store.read().await?;
        let plan = db
            .diet_plans
            .iter()
            .find(|p| p.id == plan_id)
            .cloned()
            .ok_or_else(|| plan_not_found(plan_id))?;
        let meals: Vec<_> = db
            .meals
            .iter()
            .filter(|m| m.diet_plan_id == plan_id)
            .cloned()
            .collect();
        let ingredients = db
            .ingredients
            .iter()
            .filter(|i| meals.iter().any(|m| m.id == i.meal_id))
            .cloned()
            .collect();
        Ok(DietPlanDetail::from_rows(plan, meals, ingredients))
    }

    async fn create_diet_plan(
        &self,
        trainer_id: Uuid,
        plan: NewDietPlan,
    ) -> Result<DietPlanDetail, AppError> {
        self.store
            .update(|db| {
                check_plan_student(db, trainer_id, plan.student_id)?;
                let detail = DietPlanDetail::build(trainer_id, plan, false, Utc::now());
                insert_diet_plan(db, &detail);
                Ok(detail)
            })
            .await
    }

    async fn delete_diet_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError> {
        self.store
            .update(|db| {
                if !db
                    .diet_plans
                    .iter()
                    .any(|p| p.id == plan_id && p.trainer_id == trainer_id)
                {
                    return Err(plan_not_found(plan_id));
                }
                remove_diet_plan(db, plan_id);
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        MacroTotals, NewIngredient, NewMeal, NewPlanExercise, StudentProfile, TrainerProfile,
    };

    struct Fixture {
        store: Arc<LocalStore>,
        service: LocalWorkoutService,
        trainer_id: Uuid,
        student_id: Uuid,
        squat: Exercise,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(LocalStore::in_memory());
        let trainer_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        store
            .update(|db| {
                let now = Utc::now();
                db.trainer_profiles.push(TrainerProfile::new(trainer_id, now));
                db.student_profiles
                    .push(StudentProfile::new(student_id, Some(trainer_id), now));
                Ok(())
            })
            .await
            .unwrap();
        let service = LocalWorkoutService::new(store.clone());
        let squat = service
            .create_exercise(
                trainer_id,
                NewExercise {
                    name: "Back squat".to_string(),
                    muscle_group: "legs".to_string(),
                    equipment: Some("barbell".to_string()),
                    instructions: None,
                    video_url: None,
                },
            )
            .await
            .unwrap();
        Fixture {
            store,
            service,
            trainer_id,
            student_id,
            squat,
        }
    }

    fn template(exercise_id: Uuid) -> NewWorkoutPlan {
        NewWorkoutPlan {
            name: "Legs".to_string(),
            description: None,
            goal: None,
            student_id: None,
            is_template: true,
            starts_on: None,
            ends_on: None,
            exercises: vec![
                NewPlanExercise {
                    exercise_id,
                    day_of_week: Some(0),
                    sets: 5,
                    reps: "5".to_string(),
                    rest_seconds: 180,
                    weight_kg: Some(100.0),
                    notes: None,
                },
                NewPlanExercise {
                    exercise_id,
                    day_of_week: Some(3),
                    sets: 3,
                    reps: "8".to_string(),
                    rest_seconds: 120,
                    weight_kg: Some(80.0),
                    notes: Some("paused".to_string()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_assign_template_copies_exercises() {
        let f = fixture().await;
        let created = f
            .service
            .create_workout_plan(f.trainer_id, template(f.squat.id))
            .await
            .unwrap();

        let copy = f
            .service
            .assign_template(f.trainer_id, created.plan.id, f.student_id)
            .await
            .unwrap();

        assert_ne!(copy.plan.id, created.plan.id);
        assert!(!copy.plan.is_template);
        assert_eq!(copy.plan.student_id, Some(f.student_id));
        assert_eq!(copy.exercises.len(), 2);

        let template = f.service.get_workout_plan(created.plan.id).await.unwrap();
        assert_eq!(template, created);

        let db = f.store.read().await.unwrap();
        assert_eq!(db.workout_plans.len(), 2);
        assert_eq!(db.workout_plan_exercises.len(), 4);

        let student_plans = f
            .service
            .list_student_workout_plans(f.student_id)
            .await
            .unwrap();
        assert_eq!(student_plans.len(), 1);
        assert_eq!(
            f.service.list_templates(f.trainer_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_assign_rejects_plain_plans_and_unlinked_students() {
        let f = fixture().await;
        let mut plain = template(f.squat.id);
        plain.is_template = false;
        let plain = f
            .service
            .create_workout_plan(f.trainer_id, plain)
            .await
            .unwrap();
        let err = f
            .service
            .assign_template(f.trainer_id, plain.plan.id, f.student_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let tpl = f
            .service
            .create_workout_plan(f.trainer_id, template(f.squat.id))
            .await
            .unwrap();
        let err = f
            .service
            .assign_template(f.trainer_id, tpl.plan.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_exercise_is_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create_workout_plan(f.trainer_id, template(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(f.store.read().await.unwrap().workout_plans.is_empty());
    }

    #[tokio::test]
    async fn test_diet_plan_round_trip_and_delete() {
        let f = fixture().await;
        let created = f
            .service
            .create_diet_plan(
                f.trainer_id,
                NewDietPlan {
                    name: "Cut".to_string(),
                    description: None,
                    goal: Some("fat loss".to_string()),
                    student_id: Some(f.student_id),
                    target_calories: Some(1800),
                    meals: vec![NewMeal {
                        name: "Breakfast".to_string(),
                        time_of_day: Some("07:30".to_string()),
                        ingredients: vec![NewIngredient {
                            name: "Oats".to_string(),
                            quantity: 80.0,
                            unit: "g".to_string(),
                            macros: MacroTotals {
                                calories: 311.0,
                                protein_g: 13.5,
                                carbs_g: 52.8,
                                fat_g: 5.5,
                            },
                        }],
                    }],
                },
            )
            .await
            .unwrap();

        let fetched = f.service.get_diet_plan(created.plan.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.meals[0].meal.totals.calories, 311.0);

        let err = f
            .service
            .delete_diet_plan(Uuid::new_v4(), created.plan.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        f.service
            .delete_diet_plan(f.trainer_id, created.plan.id)
            .await
            .unwrap();
        let db = f.store.read().await.unwrap();
        assert!(db.diet_plans.is_empty());
        assert!(db.meals.is_empty());
        assert!(db.ingredients.is_empty());
    }
}
