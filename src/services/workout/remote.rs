// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{
    check_new_workout_plan, plan_not_found, referenced_exercises, unknown_exercise,
    WorkoutService,
};
use crate::db::{tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    DietPlan, DietPlanDetail, Exercise, Ingredient, Meal, NewDietPlan, NewExercise,
    NewWorkoutPlan, StudentProfile, WorkoutPlan, WorkoutPlanDetail, WorkoutPlanExercise,
};
use crate::services::trainer::not_linked;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct IdRow {
    id: Uuid,
}

pub struct RemoteWorkoutService {
    db: RemoteDb,
}

impl RemoteWorkoutService {
    pub fn new(db: RemoteDb) -> Self {
        Self { db }
    }

    async fn owned_workout_plan(
        &self,
        trainer_id: Uuid,
        plan_id: Uuid,
    ) -> Result<WorkoutPlan, AppError> {
        self.db
            .from(tables::WORKOUT_PLANS)?
            .eq("id", plan_id)
            .eq("trainer_id", trainer_id)
            .fetch_one()
            .await?
            .ok_or_else(|| plan_not_found(plan_id))
    }
}

/// Fail unless `student_id` is linked to `trainer_id`.
pub(crate) async fn check_plan_student(
    db: &RemoteDb,
    trainer_id: Uuid,
    student_id: Option<Uuid>,
) -> Result<(), AppError> {
    let Some(student_id) = student_id else {
        return Ok(());
    };
    let linked: Option<StudentProfile> = db
        .from(tables::STUDENT_PROFILES)?
        .eq("user_id", student_id)
        .eq("trainer_id", trainer_id)
        .fetch_one()
        .await?;
    linked.map(|_| ()).ok_or_else(|| not_linked(student_id))
}

/// Insert a plan header and its exercise rows.
///
/// The header is removed again if the exercise rows cannot be written.
pub(crate) async fn insert_workout_plan(
    db: &RemoteDb,
    detail: &WorkoutPlanDetail,
) -> Result<(), AppError> {
    db.from(tables::WORKOUT_PLANS)?
        .insert::<_, WorkoutPlan>(&detail.plan)
        .await?;
    if detail.exercises.is_empty() {
        return Ok(());
    }
    if let Err(e) = db
        .from(tables::WORKOUT_PLAN_EXERCISES)?
        .insert::<_, WorkoutPlanExercise>(&detail.exercises)
        .await
    {
        delete_workout_plan_rows(db, detail.plan.id).await?;
        return Err(e);
    }
    Ok(())
}

/// Insert a diet plan, its meals and their ingredients.
pub(crate) async fn insert_diet_plan(db: &RemoteDb, detail: &DietPlanDetail) -> Result<(), AppError> {
    let (plan, meals, ingredients) = detail.clone().into_rows();
    db.from(tables::DIET_PLANS)?
        .insert::<_, DietPlan>(&plan)
        .await?;

    let children = async {
        if !meals.is_empty() {
            db.from(tables::MEALS)?.insert::<_, Meal>(&meals).await?;
        }
        if !ingredients.is_empty() {
            db.from(tables::INGREDIENTS)?
                .insert::<_, Ingredient>(&ingredients)
                .await?;
        }
        Ok::<(), AppError>(())
    };
    if let Err(e) = children.await {
        delete_diet_plan_rows(db, plan.id).await?;
        return Err(e);
    }
    Ok(())
}

/// Delete a workout plan and its exercise rows.
pub(crate) async fn delete_workout_plan_rows(db: &RemoteDb, plan_id: Uuid) -> Result<(), AppError> {
    db.from(tables::WORKOUT_PLAN_EXERCISES)?
        .eq("workout_plan_id", plan_id)
        .delete()
        .await?;
    db.from(tables::WORKOUT_PLANS)?
        .eq("id", plan_id)
        .delete()
        .await?;
    Ok(())
}

/// Delete a diet plan with its meals and ingredients.
pub(crate) async fn delete_diet_plan_rows(db: &RemoteDb, plan_id: Uuid) -> Result<(), AppError> {
    let meals: Vec<IdRow> = db
        .from(tables::MEALS)?
        .select("id")
        .eq("diet_plan_id", plan_id)
        .fetch()
        .await?;
    if !meals.is_empty() {
        db.from(tables::INGREDIENTS)?
            .is_in("meal_id", meals.iter().map(|m| m.id))
            .delete()
            .await?;
        db.from(tables::MEALS)?
            .eq("diet_plan_id", plan_id)
            .delete()
            .await?;
    }
    db.from(tables::DIET_PLANS)?
        .eq("id", plan_id)
        .delete()
        .await?;
    Ok(())
}

#[async_trait]
impl WorkoutService for RemoteWorkoutService {
    async fn list_exercises(&self) -> Result<Vec<Exercise>, AppError> {
        self.db
            .from(tables::EXERCISES)?
            .order("name", true)
            .fetch()
            .await
    }

    async fn create_exercise(
        &self,
        created_by: Uuid,
        exercise: NewExercise,
    ) -> Result<Exercise, AppError> {
        let exercise = exercise.into_exercise(Some(created_by), Utc::now());
        let stored: Vec<Exercise> = self
            .db
            .from(tables::EXERCISES)?
            .insert(&exercise)
            .await?;
        Ok(stored.into_iter().next().unwrap_or(exercise))
    }

    async fn list_workout_plans(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError> {
        self.db
            .from(tables::WORKOUT_PLANS)?
            .eq("trainer_id", trainer_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn list_student_workout_plans(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<WorkoutPlan>, AppError> {
        self.db
            .from(tables::WORKOUT_PLANS)?
            .eq("student_id", student_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn list_templates(&self, trainer_id: Uuid) -> Result<Vec<WorkoutPlan>, AppError> {
        self.db
            .from(tables::WORKOUT_PLANS)?
            .eq("trainer_id", trainer_id)
            .eq("is_template", true)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn get_workout_plan(&self, plan_id: Uuid) -> Result<WorkoutPlanDetail, AppError> {
        let plan: WorkoutPlan = self
            .db
            .from(tables::WORKOUT_PLANS)?
            .eq("id", plan_id)
            .fetch_one()
            .await?
            .ok_or_else(|| plan_not_found(plan_id))?;
        let exercises = self
            .db
            .from(tables::WORKOUT_PLAN_EXERCISES)?
            .eq("workout_plan_id", plan_id)
            .order("position", true)
            .fetch()
            .await?;
        Ok(WorkoutPlanDetail { plan, exercises })
    }

    async fn create_workout_plan(
        &self,
        trainer_id: Uuid,
        plan: NewWorkoutPlan,
    ) -> Result<WorkoutPlanDetail, AppError> {
        check_new_workout_plan(&plan)?;
        check_plan_student(&self.db, trainer_id, plan.student_id).await?;

        let wanted = referenced_exercises(&plan);
        if !wanted.is_empty() {
            let found: Vec<IdRow> = self
                .db
                .from(tables::EXERCISES)?
                .select("id")
                .is_in("id", wanted.iter())
                .fetch()
                .await?;
            if let Some(missing) = wanted.iter().find(|id| !found.iter().any(|f| f.id == **id)) {
                return Err(unknown_exercise(*missing));
            }
        }

        let detail = WorkoutPlanDetail::build(trainer_id, plan, false, Utc::now());
        insert_workout_plan(&self.db, &detail).await?;
        Ok(detail)
    }

    async fn delete_workout_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError> {
        self.owned_workout_plan(trainer_id, plan_id).await?;
        delete_workout_plan_rows(&self.db, plan_id).await
    }

    async fn assign_template(
        &self,
        trainer_id: Uuid,
        template_id: Uuid,
        student_id: Uuid,
    ) -> Result<WorkoutPlanDetail, AppError> {
        let template = self.get_workout_plan(template_id).await?;
        if template.plan.trainer_id != trainer_id {
            return Err(plan_not_found(template_id));
        }
        if !template.plan.is_template {
            return Err(AppError::BadRequest(format!(
                "Plan {} is not a template",
                template_id
            )));
        }
        check_plan_student(&self.db, trainer_id, Some(student_id)).await?;

        let copy = template.instantiate_for(student_id, Utc::now());
        insert_workout_plan(&self.db, &copy).await?;
        tracing::info!(
            template_id = %template_id,
            plan_id = %copy.plan.id,
            student_id = %student_id,
            "Template assigned"
        );
        Ok(copy)
    }

    async fn list_diet_plans(&self, trainer_id: Uuid) -> Result<Vec<DietPlan>, AppError> {
        self.db
            .from(tables::DIET_PLANS)?
            .eq("trainer_id", trainer_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn list_student_diet_plans(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<DietPlan>, AppError> {
        self.db
            .from(tables::DIET_PLANS)?
            .eq("student_id", student_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn get_diet_plan(&self, plan_id: Uuid) -> Result<DietPlanDetail, AppError> {
        let plan: DietPlan = self
            .db
            .from(tables::DIET_PLANS)?
            .eq("id", plan_id)
            .fetch_one()
            .await?
            .ok_or_else(|| plan_not_found(plan_id))?;
        let meals: Vec<Meal> = self
            .db
            .from(tables::MEALS)?
            .eq("diet_plan_id", plan_id)
            .order("position", true)
            .fetch()
            .await?;
        let ingredients: Vec<Ingredient> = if meals.is_empty() {
            Vec::new()
        } else {
            self.db
                .from(tables::INGREDIENTS)?
                .is_in("meal_id", meals.iter().map(|m| m.id))
                .fetch()
                .await?
        };
        Ok(DietPlanDetail::from_rows(plan, meals, ingredients))
    }

    async fn create_diet_plan(
        &self,
        trainer_id: Uuid,
        plan: NewDietPlan,
    ) -> Result<DietPlanDetail, AppError> {
        check_plan_student(&self.db, trainer_id, plan.student_id).await?;
        let detail = DietPlanDetail::build(trainer_id, plan, false, Utc::now());
        insert_diet_plan(&self.db, &detail).await?;
        Ok(detail)
    }

    async fn delete_diet_plan(&self, trainer_id: Uuid, plan_id: Uuid) -> Result<(), AppError> {
        let owned: Option<DietPlan> = self
            .db
            .from(tables::DIET_PLANS)?
            .eq("id", plan_id)
            .eq("trainer_id", trainer_id)
            .fetch_one()
            .await?;
        if owned.is_none() {
            return Err(plan_not_found(plan_id));
        }
        delete_diet_plan_rows(&self.db, plan_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPlanExercise, TrainerProfile};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_failed_exercise_insert_removes_plan_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/workout_plans"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/workout_plan_exercises"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad row"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/workout_plan_exercises"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/workout_plans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let trainer = TrainerProfile::new(Uuid::new_v4(), Utc::now());
        let detail = WorkoutPlanDetail::build(
            trainer.user_id,
            NewWorkoutPlan {
                name: "Pull".to_string(),
                description: None,
                goal: None,
                student_id: None,
                is_template: true,
                starts_on: None,
                ends_on: None,
                exercises: vec![NewPlanExercise {
                    exercise_id: Uuid::new_v4(),
                    day_of_week: None,
                    sets: 3,
                    reps: "10".to_string(),
                    rest_seconds: 60,
                    weight_kg: None,
                    notes: None,
                }],
            },
            false,
            Utc::now(),
        );

        let err = insert_workout_plan(&db, &detail).await.unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
    }
}
