// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trainer rosters and session scheduling.

pub mod local;
pub mod remote;

pub use local::LocalTrainerService;
pub use remote::RemoteTrainerService;

use crate::error::AppError;
use crate::models::{
    NewSession, NewStudent, SessionUpdate, StudentSummary, TrainerProfile, TrainerSummary,
    TrainingSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Optional bounds on `scheduled_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SessionRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[async_trait]
pub trait TrainerService: Send + Sync {
    async fn list_trainers(&self) -> Result<Vec<TrainerSummary>, AppError>;

    async fn get_trainer(&self, trainer_id: Uuid) -> Result<TrainerProfile, AppError>;

    async fn list_students(&self, trainer_id: Uuid) -> Result<Vec<StudentSummary>, AppError>;

    /// Link a student by email, creating the profile if needed.
    ///
    /// Fails with [`AppError::PlanLimitReached`] when the trainer's plan is full.
    async fn add_student(
        &self,
        trainer_id: Uuid,
        student: NewStudent,
    ) -> Result<StudentSummary, AppError>;

    /// Unlink a student. The student's account and history are kept.
    async fn remove_student(&self, trainer_id: Uuid, student_id: Uuid) -> Result<(), AppError>;

    async fn list_sessions(
        &self,
        trainer_id: Uuid,
        range: SessionRange,
    ) -> Result<Vec<TrainingSession>, AppError>;

    async fn list_student_sessions(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<TrainingSession>, AppError>;

    /// Book a session with a linked student. Overlapping bookings are a conflict.
    async fn schedule_session(
        &self,
        trainer_id: Uuid,
        session: NewSession,
    ) -> Result<TrainingSession, AppError>;

    async fn update_session(
        &self,
        trainer_id: Uuid,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<TrainingSession, AppError>;

    async fn delete_session(&self, trainer_id: Uuid, session_id: Uuid) -> Result<(), AppError>;
}

pub(crate) fn overlap_conflict(existing: &TrainingSession) -> AppError {
    AppError::Conflict(format!(
        "Overlaps session {} at {}",
        existing.id,
        crate::time_utils::format_utc_rfc3339(existing.scheduled_at)
    ))
}

pub(crate) fn not_linked(student_id: Uuid) -> AppError {
    AppError::NotFound(format!("Student {} is not linked to this trainer", student_id))
}
