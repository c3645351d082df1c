// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog, workout plans, templates and diet plans.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::trainer::TrainerQuery;
use crate::cache;
use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    DietPlan, DietPlanDetail, Exercise, NewDietPlan, NewExercise, NewWorkoutPlan, Role,
    WorkoutPlan, WorkoutPlanDetail,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route(
            "/api/workout-plans",
            get(list_workout_plans).post(create_workout_plan),
        )
        .route(
            "/api/workout-plans/{id}",
            get(get_workout_plan).delete(delete_workout_plan),
        )
        .route("/api/workout-templates", get(list_templates))
        .route("/api/workout-templates/{id}/assign", post(assign_template))
        .route("/api/diet-plans", get(list_diet_plans).post(create_diet_plan))
        .route(
            "/api/diet-plans/{id}",
            get(get_diet_plan).delete(delete_diet_plan),
        )
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub student_id: Uuid,
}

/// Plans are only revealed to their trainer, their student and admins.
fn check_visible(user: &AuthUser, visible: bool, plan_id: Uuid) -> Result<()> {
    if visible || user.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Plan {} not found", plan_id)))
    }
}

async fn list_exercises(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Exercise>>> {
    let exercises = state
        .cache
        .get_or_fetch(&cache::key(keys::WORKOUTS, "exercises"), || {
            state.services.workouts.list_exercises()
        })
        .await?;
    Ok(Json(exercises))
}

async fn create_exercise(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(exercise): Json<NewExercise>,
) -> Result<(StatusCode, Json<Exercise>)> {
    user.require_role(&[Role::Trainer, Role::Admin])?;
    exercise.validate()?;

    let exercise = state
        .services
        .workouts
        .create_exercise(user.user_id, exercise)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn list_workout_plans(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Vec<WorkoutPlan>>> {
    let plans = if user.role == Role::Student {
        state
            .cache
            .get_or_fetch(
                &cache::key(keys::WORKOUTS, format!("student/{}/plans", user.user_id)),
                || state.services.workouts.list_student_workout_plans(user.user_id),
            )
            .await?
    } else {
        let trainer_id = user.trainer_scope(query.trainer_id)?;
        state
            .cache
            .get_or_fetch(
                &cache::key(keys::WORKOUTS, format!("{}/plans", trainer_id)),
                || state.services.workouts.list_workout_plans(trainer_id),
            )
            .await?
    };
    Ok(Json(plans))
}

async fn create_workout_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
    Json(plan): Json<NewWorkoutPlan>,
) -> Result<(StatusCode, Json<WorkoutPlanDetail>)> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    plan.validate()?;

    let plan = state
        .services
        .workouts
        .create_workout_plan(trainer_id, plan)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_workout_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<WorkoutPlanDetail>> {
    let detail: WorkoutPlanDetail = state
        .cache
        .get_or_fetch(
            &cache::key(keys::WORKOUTS, format!("plan/{}", plan_id)),
            || state.services.workouts.get_workout_plan(plan_id),
        )
        .await?;
    check_visible(&user, detail.plan.visible_to(user.user_id), plan_id)?;
    Ok(Json(detail))
}

async fn delete_workout_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
) -> Result<StatusCode> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    state
        .services
        .workouts
        .delete_workout_plan(trainer_id, plan_id)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Vec<WorkoutPlan>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let templates = state
        .cache
        .get_or_fetch(
            &cache::key(keys::WORKOUTS, format!("{}/templates", trainer_id)),
            || state.services.workouts.list_templates(trainer_id),
        )
        .await?;
    Ok(Json(templates))
}

async fn assign_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
    Json(request): Json<AssignRequest>,
) -> Result<(StatusCode, Json<WorkoutPlanDetail>)> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let plan = state
        .services
        .workouts
        .assign_template(trainer_id, template_id, request.student_id)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn list_diet_plans(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Vec<DietPlan>>> {
    let plans = if user.role == Role::Student {
        state
            .cache
            .get_or_fetch(
                &cache::key(keys::WORKOUTS, format!("student/{}/diets", user.user_id)),
                || state.services.workouts.list_student_diet_plans(user.user_id),
            )
            .await?
    } else {
        let trainer_id = user.trainer_scope(query.trainer_id)?;
        state
            .cache
            .get_or_fetch(
                &cache::key(keys::WORKOUTS, format!("{}/diets", trainer_id)),
                || state.services.workouts.list_diet_plans(trainer_id),
            )
            .await?
    };
    Ok(Json(plans))
}

async fn create_diet_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
    Json(plan): Json<NewDietPlan>,
) -> Result<(StatusCode, Json<DietPlanDetail>)> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    plan.validate()?;

    let plan = state
        .services
        .workouts
        .create_diet_plan(trainer_id, plan)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_diet_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<DietPlanDetail>> {
    let detail: DietPlanDetail = state
        .cache
        .get_or_fetch(
            &cache::key(keys::WORKOUTS, format!("diet/{}", plan_id)),
            || state.services.workouts.get_diet_plan(plan_id),
        )
        .await?;
    check_visible(&user, detail.plan.visible_to(user.user_id), plan_id)?;
    Ok(Json(detail))
}

async fn delete_diet_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
) -> Result<StatusCode> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    state
        .services
        .workouts
        .delete_diet_plan(trainer_id, plan_id)
        .await?;
    super::invalidate(&state, &[keys::WORKOUTS]);
    Ok(StatusCode::NO_CONTENT)
}
