// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{not_linked, overlap_conflict, SessionRange, TrainerService};
use crate::db::{LocalDatabase, LocalStore};
use crate::error::AppError;
use crate::models::{
    normalize_email, NewSession, NewStudent, Profile, Role, SessionUpdate, StudentProfile,
    StudentSummary, TrainerProfile, TrainerSummary, TrainingSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalTrainerService {
    store: Arc<LocalStore>,
}

impl LocalTrainerService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

fn summary(db: &LocalDatabase, student: &StudentProfile) -> Result<StudentSummary, AppError> {
    let profile = db
        .profile(student.user_id)
        .cloned()
        .ok_or_else(|| AppError::Database(format!("Student {} has no profile", student.user_id)))?;
    Ok(StudentSummary {
        profile,
        student: student.clone(),
    })
}

fn ensure_linked(db: &LocalDatabase, trainer_id: Uuid, student_id: Uuid) -> Result<(), AppError> {
    if db.is_linked(trainer_id, student_id) {
        Ok(())
    } else {
        Err(not_linked(student_id))
    }
}

/// First active trainer session overlapping the given slot.
fn find_overlap(
    db: &LocalDatabase,
    trainer_id: Uuid,
    skip: Option<Uuid>,
    start: DateTime<Utc>,
    duration_minutes: u32,
) -> Option<&TrainingSession> {
    db.sessions.iter().find(|s| {
        s.trainer_id == trainer_id && Some(s.id) != skip && s.overlaps(start, duration_minutes)
    })
}

fn add_student_to(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    new: &NewStudent,
) -> Result<StudentSummary, AppError> {
    db.ensure_student_capacity(trainer_id)?;
    let email = normalize_email(&new.email);
    let now = Utc::now();

    let user_id = match db.profile_by_email(&email) {
        Some(existing) if existing.role != Role::Student => {
            return Err(AppError::Conflict(format!(
                "{} is registered as a {}",
                email,
                existing.role.as_str()
            )));
        }
        Some(existing) => {
            let user_id = existing.id;
            match db.student(user_id).and_then(|s| s.trainer_id) {
                Some(current) if current == trainer_id => {
                    return Err(AppError::Conflict("Student is already linked".to_string()));
                }
                Some(_) => {
                    return Err(AppError::Conflict(
                        "Student is linked to another trainer".to_string(),
                    ));
                }
                None => {}
            }
            user_id
        }
        None => {
            let user_id = Uuid::new_v4();
            db.profiles.push(Profile {
                id: user_id,
                email: email.clone(),
                full_name: new.full_name.clone(),
                role: Role::Student,
                phone: None,
                avatar_url: None,
                created_at: now,
                updated_at: now,
            });
            user_id
        }
    };

    let index = match db.student_profiles.iter().position(|s| s.user_id == user_id) {
        Some(index) => index,
        None => {
            db.student_profiles
                .push(StudentProfile::new(user_id, None, now));
            db.student_profiles.len() - 1
        }
    };
    let student = &mut db.student_profiles[index];
    student.trainer_id = Some(trainer_id);
    new.apply(student);
    student.updated_at = now;
    let student = student.clone();

    summary(db, &student)
}

#[async_trait]
impl TrainerService for LocalTrainerService {
    async fn list_trainers(&self) -> Result<Vec<TrainerSummary>, AppError> {
        let db = self.store.read().await?;
        db.trainer_profiles
            .iter()
            .map(|trainer| -> Result<TrainerSummary, AppError> {
                let profile = db.profile(trainer.user_id).cloned().ok_or_else(|| {
                    AppError::Database(format!("Trainer {} has no profile", trainer.user_id))
                })?;
                Ok(TrainerSummary {
                    profile,
                    trainer: trainer.clone(),
                    student_count: db.students_of(trainer.user_id).count(),
                })
            })
            .collect()
    }

    async fn get_trainer(&self, trainer_id: Uuid) -> Result<TrainerProfile, AppError> {
        let db = self.store.read().await?;
        db.trainer(trainer_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))
    }

    async fn list_students(&self, trainer_id: Uuid) -> Result<Vec<StudentSummary>, AppError> {
        let db = self.store.read().await?;
        db.students_of(trainer_id)
            .map(|student| summary(&db, student))
            .collect()
    }

    async fn add_student(
        &self,
        trainer_id: Uuid,
        student: NewStudent,
    ) -> Result<StudentSummary, AppError> {
        let added = self
            .store
            .update(|db| add_student_to(db, trainer_id, &student))
            .await?;
        tracing::info!(trainer_id = %trainer_id, student_id = %added.profile.id, "Student linked");
        Ok(added)
    }

    async fn remove_student(&self, trainer_id: Uuid, student_id: Uuid) -> Result<(), AppError> {
        self.store
            .update(|db| {
                let student = db
                    .student_profiles
                    .iter_mut()
                    .find(|s| s.user_id == student_id && s.trainer_id == Some(trainer_id))
                    .ok_or_else(|| not_linked(student_id))?;
                student.trainer_id = None;
                student.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn list_sessions(
        &self,
        trainer_id: Uuid,
        range: SessionRange,
    ) -> Result<Vec<TrainingSession>, AppError> {
        let db = self.store.read().await?;
        let mut sessions: Vec<TrainingSession> = db
            .sessions
            .into_iter()
            .filter(|s| s.trainer_id == trainer_id && range.contains(s.scheduled_at))
            .collect();
        sessions.sort_by_key(|s| s.scheduled_at);
        Ok(sessions)
    }

    async fn list_student_sessions(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<TrainingSession>, AppError> {
        let db = self.store.read().await?;
        let mut sessions: Vec<TrainingSession> = db
            .sessions
            .into_iter()
            .filter(|s| s.student_id == student_id)
            .collect();
        sessions.sort_by_key(|s| s.scheduled_at);
        Ok(sessions)
    }

    async fn schedule_session(
        &self,
        trainer_id: Uuid,
        session: NewSession,
    ) -> Result<TrainingSession, AppError> {
        self.store
            .update(|db| {
                ensure_linked(db, trainer_id, session.student_id)?;
                if let Some(existing) = find_overlap(
                    db,
                    trainer_id,
                    None,
                    session.scheduled_at,
                    session.duration_minutes,
                ) {
                    return Err(overlap_conflict(existing));
                }
                let created = session.into_session(trainer_id, Utc::now());
                db.sessions.push(created.clone());
                Ok(created)
            })
            .await
    }

    async fn update_session(
        &self,
        trainer_id: Uuid,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<TrainingSession, AppError> {
        self.store
            .update(|db| {
                let index = db
                    .sessions
                    .iter()
                    .position(|s| s.id == session_id && s.trainer_id == trainer_id)
                    .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

                let reschedules = update.reschedules();
                let mut updated = db.sessions[index].clone();
                update.apply(&mut updated, Utc::now());

                if reschedules {
                    if let Some(existing) = find_overlap(
                        db,
                        trainer_id,
                        Some(session_id),
                        updated.scheduled_at,
                        updated.duration_minutes,
                    ) {
                        return Err(overlap_conflict(existing));
                    }
                }

                db.sessions[index] = updated.clone();
                Ok(updated)
            })
            .await
    }

    async fn delete_session(&self, trainer_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        self.store
            .update(|db| {
                let before = db.sessions.len();
                db.sessions
                    .retain(|s| !(s.id == session_id && s.trainer_id == trainer_id));
                if db.sessions.len() == before {
                    return Err(AppError::NotFound(format!("Session {} not found", session_id)));
                }
                Ok(())
            })
            .await
    }
}
