// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{not_linked, overlap_conflict, SessionRange, TrainerService};
use crate::db::{tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    normalize_email, NewSession, NewStudent, Profile, Role, SessionStatus, SessionUpdate,
    StudentProfile, StudentSummary, TrainerProfile, TrainerSummary, TrainingSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::IgnoredAny;
use std::collections::HashMap;
use uuid::Uuid;

/// Longest bookable session, used to bound the overlap query.
const MAX_SESSION_MINUTES: i64 = 480;

pub struct RemoteTrainerService {
    db: RemoteDb,
}

impl RemoteTrainerService {
    pub fn new(db: RemoteDb) -> Self {
        Self { db }
    }

    async fn student_of(
        &self,
        trainer_id: Uuid,
        student_id: Uuid,
    ) -> Result<StudentProfile, AppError> {
        self.db
            .from(tables::STUDENT_PROFILES)?
            .eq("user_id", student_id)
            .eq("trainer_id", trainer_id)
            .fetch_one()
            .await?
            .ok_or_else(|| not_linked(student_id))
    }

    async fn find_overlap(
        &self,
        trainer_id: Uuid,
        skip: Option<Uuid>,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Option<TrainingSession>, AppError> {
        let end = start + Duration::minutes(i64::from(duration_minutes));
        let candidates: Vec<TrainingSession> = self
            .db
            .from(tables::SESSIONS)?
            .eq("trainer_id", trainer_id)
            .neq("status", "cancelled")
            .gte(
                "scheduled_at",
                (start - Duration::minutes(MAX_SESSION_MINUTES)).to_rfc3339(),
            )
            .lte("scheduled_at", end.to_rfc3339())
            .fetch()
            .await?;

        Ok(candidates
            .into_iter()
            .find(|s| Some(s.id) != skip && s.overlaps(start, duration_minutes)))
    }

    async fn profiles_by_id(&self, ids: Vec<Uuid>) -> Result<HashMap<Uuid, Profile>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let profiles: Vec<Profile> = self
            .db
            .from(tables::PROFILES)?
            .is_in("id", ids)
            .fetch()
            .await?;
        Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
    }
}

/// Fail when the trainer cannot take another student.
pub(crate) async fn ensure_student_capacity(
    db: &RemoteDb,
    trainer_id: Uuid,
) -> Result<(), AppError> {
    let trainer: TrainerProfile = db
        .from(tables::TRAINER_PROFILES)?
        .eq("user_id", trainer_id)
        .fetch_one()
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))?;
    // Only the count matters.
    let linked: Vec<IgnoredAny> = db
        .from(tables::STUDENT_PROFILES)?
        .select("id")
        .eq("trainer_id", trainer_id)
        .fetch()
        .await?;

    if linked.len() >= trainer.max_students as usize {
        return Err(AppError::PlanLimitReached(format!(
            "The {} plan allows {} students",
            trainer.plan, trainer.max_students
        )));
    }
    Ok(())
}

#[async_trait]
impl TrainerService for RemoteTrainerService {
    async fn list_trainers(&self) -> Result<Vec<TrainerSummary>, AppError> {
        let trainers: Vec<TrainerProfile> = self
            .db
            .from(tables::TRAINER_PROFILES)?
            .order("created_at", true)
            .fetch()
            .await?;
        if trainers.is_empty() {
            return Ok(Vec::new());
        }
        let students: Vec<StudentProfile> = self
            .db
            .from(tables::STUDENT_PROFILES)?
            .select("id,user_id,trainer_id,created_at,updated_at")
            .is_in("trainer_id", trainers.iter().map(|t| t.user_id))
            .fetch()
            .await?;
        let mut profiles = self
            .profiles_by_id(trainers.iter().map(|t| t.user_id).collect())
            .await?;

        trainers
            .into_iter()
            .map(|trainer| -> Result<TrainerSummary, AppError> {
                let profile = profiles.remove(&trainer.user_id).ok_or_else(|| {
                    AppError::Database(format!("Trainer {} has no profile", trainer.user_id))
                })?;
                let student_count = students
                    .iter()
                    .filter(|s| s.trainer_id == Some(trainer.user_id))
                    .count();
                Ok(TrainerSummary {
                    profile,
                    trainer,
                    student_count,
                })
            })
            .collect()
    }

    async fn get_trainer(&self, trainer_id: Uuid) -> Result<TrainerProfile, AppError> {
        self.db
            .from(tables::TRAINER_PROFILES)?
            .eq("user_id", trainer_id)
            .fetch_one()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))
    }

    async fn list_students(&self, trainer_id: Uuid) -> Result<Vec<StudentSummary>, AppError> {
        let students: Vec<StudentProfile> = self
            .db
            .from(tables::STUDENT_PROFILES)?
            .eq("trainer_id", trainer_id)
            .order("created_at", true)
            .fetch()
            .await?;
        let mut profiles = self
            .profiles_by_id(students.iter().map(|s| s.user_id).collect())
            .await?;

        students
            .into_iter()
            .map(|student| {
                profiles
                    .remove(&student.user_id)
                    .map(|profile| StudentSummary { profile, student })
                    .ok_or_else(|| AppError::Database("Student without profile".to_string()))
            })
            .collect()
    }

    async fn add_student(
        &self,
        trainer_id: Uuid,
        new: NewStudent,
    ) -> Result<StudentSummary, AppError> {
        ensure_student_capacity(&self.db, trainer_id).await?;
        let email = normalize_email(&new.email);
        let now = Utc::now();

        let existing: Option<Profile> = self
            .db
            .from(tables::PROFILES)?
            .eq("email", &email)
            .fetch_one()
            .await?;

        let profile = match existing {
            Some(profile) if profile.role != Role::Student => {
                return Err(AppError::Conflict(format!(
                    "{} is registered as a {}",
                    email,
                    profile.role.as_str()
                )));
            }
            Some(profile) => profile,
            None => {
                // Random password; the student sets their own through account recovery.
                let password = Uuid::new_v4().simple().to_string();
                let user = self.db.create_user(&email, &password).await?;
                let profile = Profile {
                    id: user.id,
                    email: email.clone(),
                    full_name: new.full_name.clone(),
                    role: Role::Student,
                    phone: None,
                    avatar_url: None,
                    created_at: now,
                    updated_at: now,
                };
                self.db
                    .from(tables::PROFILES)?
                    .insert::<_, Profile>(&profile)
                    .await?;
                profile
            }
        };

        let current: Option<StudentProfile> = self
            .db
            .from(tables::STUDENT_PROFILES)?
            .eq("user_id", profile.id)
            .fetch_one()
            .await?;

        let exists = current.is_some();
        let mut student = match current {
            Some(s) if s.trainer_id == Some(trainer_id) => {
                return Err(AppError::Conflict("Student is already linked".to_string()));
            }
            Some(s) if s.trainer_id.is_some() => {
                return Err(AppError::Conflict(
                    "Student is linked to another trainer".to_string(),
                ));
            }
            Some(s) => s,
            None => StudentProfile::new(profile.id, None, now),
        };
        student.trainer_id = Some(trainer_id);
        new.apply(&mut student);
        student.updated_at = now;

        // Only link while still unlinked so two trainers cannot claim the same student.
        let stored: Vec<StudentProfile> = if exists {
            self.db
                .from(tables::STUDENT_PROFILES)?
                .eq("id", student.id)
                .is_null("trainer_id")
                .update(&student)
                .await?
        } else {
            self.db
                .from(tables::STUDENT_PROFILES)?
                .insert(&student)
                .await?
        };
        let student = stored.into_iter().next().ok_or_else(|| {
            AppError::Conflict("Student is linked to another trainer".to_string())
        })?;

        tracing::info!(trainer_id = %trainer_id, student_id = %profile.id, "Student linked");
        Ok(StudentSummary { profile, student })
    }

    async fn remove_student(&self, trainer_id: Uuid, student_id: Uuid) -> Result<(), AppError> {
        let updated: Vec<StudentProfile> = self
            .db
            .from(tables::STUDENT_PROFILES)?
            .eq("user_id", student_id)
            .eq("trainer_id", trainer_id)
            .update(&serde_json::json!({
                "trainer_id": null,
                "updated_at": Utc::now(),
            }))
            .await?;
        if updated.is_empty() {
            return Err(not_linked(student_id));
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        trainer_id: Uuid,
        range: SessionRange,
    ) -> Result<Vec<TrainingSession>, AppError> {
        let mut query = self
            .db
            .from(tables::SESSIONS)?
            .eq("trainer_id", trainer_id)
            .order("scheduled_at", true);
        if let Some(from) = range.from {
            query = query.gte("scheduled_at", from.to_rfc3339());
        }
        if let Some(to) = range.to {
            query = query.lte("scheduled_at", to.to_rfc3339());
        }
        query.fetch().await
    }

    async fn list_student_sessions(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<TrainingSession>, AppError> {
        self.db
            .from(tables::SESSIONS)?
            .eq("student_id", student_id)
            .order("scheduled_at", true)
            .fetch()
            .await
    }

    async fn schedule_session(
        &self,
        trainer_id: Uuid,
        session: NewSession,
    ) -> Result<TrainingSession, AppError> {
        self.student_of(trainer_id, session.student_id).await?;
        if let Some(existing) = self
            .find_overlap(
                trainer_id,
                None,
                session.scheduled_at,
                session.duration_minutes,
            )
            .await?
        {
            return Err(overlap_conflict(&existing));
        }

        let created = session.into_session(trainer_id, Utc::now());
        let stored: Vec<TrainingSession> = self
            .db
            .from(tables::SESSIONS)?
            .insert(&created)
            .await?;
        Ok(stored.into_iter().next().unwrap_or(created))
    }

    async fn update_session(
        &self,
        trainer_id: Uuid,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<TrainingSession, AppError> {
        let mut session: TrainingSession = self
            .db
            .from(tables::SESSIONS)?
            .eq("id", session_id)
            .eq("trainer_id", trainer_id)
            .fetch_one()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

        let reschedules = update.reschedules();
        update.apply(&mut session, Utc::now());

        if reschedules && session.status != SessionStatus::Cancelled {
            if let Some(existing) = self
                .find_overlap(
                    trainer_id,
                    Some(session_id),
                    session.scheduled_at,
                    session.duration_minutes,
                )
                .await?
            {
                return Err(overlap_conflict(&existing));
            }
        }

        let stored: Vec<TrainingSession> = self
            .db
            .from(tables::SESSIONS)?
            .eq("id", session_id)
            .update(&session)
            .await?;
        Ok(stored.into_iter().next().unwrap_or(session))
    }

    async fn delete_session(&self, trainer_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let deleted = self
            .db
            .from(tables::SESSIONS)?
            .eq("id", session_id)
            .eq("trainer_id", trainer_id)
            .delete()
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }
}
