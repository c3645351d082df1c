// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trainer dashboard: plan state, student roster and session calendar.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::cache;
use crate::container::keys;
use crate::error::Result;
use crate::middleware::AuthUser;
use crate::models::{
    NewSession, NewStudent, Role, SessionUpdate, StudentSummary, TrainerProfile, TrainingSession,
};
use crate::services::SessionRange;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/trainer", get(get_trainer))
        .route("/api/students", get(list_students).post(add_student))
        .route("/api/students/{id}", delete(remove_student))
        .route("/api/sessions", get(list_sessions).post(schedule_session))
        .route(
            "/api/sessions/{id}",
            put(update_session).delete(delete_session),
        )
        .route("/api/me/sessions", get(my_sessions))
}

/// Admins pass `?trainer_id=` to act for a trainer.
#[derive(Debug, Default, Deserialize)]
pub struct TrainerQuery {
    pub trainer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub trainer_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

async fn get_trainer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<TrainerProfile>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let trainer = state
        .cache
        .get_or_fetch(&cache::key(keys::TRAINERS, trainer_id), || {
            state.services.trainers.get_trainer(trainer_id)
        })
        .await?;
    Ok(Json(trainer))
}

async fn list_students(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
) -> Result<Json<Vec<StudentSummary>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let students = state
        .cache
        .get_or_fetch(
            &cache::key(keys::TRAINERS, format!("{}/students", trainer_id)),
            || state.services.trainers.list_students(trainer_id),
        )
        .await?;
    Ok(Json(students))
}

async fn add_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
    Json(student): Json<NewStudent>,
) -> Result<(StatusCode, Json<StudentSummary>)> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    student.validate()?;

    let summary = state
        .services
        .trainers
        .add_student(trainer_id, student)
        .await?;
    tracing::info!(trainer_id = %trainer_id, student_id = %summary.profile.id, "Student linked");
    super::invalidate(&state, &[keys::TRAINERS, keys::AUTH]);
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn remove_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
) -> Result<StatusCode> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    state
        .services
        .trainers
        .remove_student(trainer_id, student_id)
        .await?;
    tracing::info!(trainer_id = %trainer_id, student_id = %student_id, "Student unlinked");
    super::invalidate(&state, &[keys::TRAINERS, keys::AUTH]);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Vec<TrainingSession>>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    let range = SessionRange {
        from: query.from,
        to: query.to,
    };
    // Bounded listings vary too much to be worth caching.
    if range.from.is_some() || range.to.is_some() {
        let sessions = state
            .services
            .trainers
            .list_sessions(trainer_id, range)
            .await?;
        return Ok(Json(sessions));
    }

    let sessions = state
        .cache
        .get_or_fetch(
            &cache::key(keys::TRAINERS, format!("{}/sessions", trainer_id)),
            || state.services.trainers.list_sessions(trainer_id, range),
        )
        .await?;
    Ok(Json(sessions))
}

async fn schedule_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrainerQuery>,
    Json(session): Json<NewSession>,
) -> Result<(StatusCode, Json<TrainingSession>)> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    session.validate()?;

    let session = state
        .services
        .trainers
        .schedule_session(trainer_id, session)
        .await?;
    super::invalidate(&state, &[keys::TRAINERS]);
    Ok((StatusCode::CREATED, Json(session)))
}

async fn update_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
    Json(update): Json<SessionUpdate>,
) -> Result<Json<TrainingSession>> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    update.validate()?;

    let session = state
        .services
        .trainers
        .update_session(trainer_id, session_id, update)
        .await?;
    super::invalidate(&state, &[keys::TRAINERS]);
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<TrainerQuery>,
) -> Result<StatusCode> {
    let trainer_id = user.trainer_scope(query.trainer_id)?;
    state
        .services
        .trainers
        .delete_session(trainer_id, session_id)
        .await?;
    super::invalidate(&state, &[keys::TRAINERS]);
    Ok(StatusCode::NO_CONTENT)
}

/// A student's own calendar.
async fn my_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<TrainingSession>>> {
    user.require_role(&[Role::Student])?;
    let sessions = state
        .cache
        .get_or_fetch(
            &cache::key(keys::TRAINERS, format!("student/{}/sessions", user.user_id)),
            || state.services.trainers.list_student_sessions(user.user_id),
        )
        .await?;
    Ok(Json(sessions))
}
