// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Accounts stored in the local document.

use super::{check_sign_up_role, hash_password, verify_password, AuthService};
use crate::db::local::{LocalUser, StoredSession};
use crate::db::{LocalDatabase, LocalStore};
use crate::error::AppError;
use crate::models::{
    normalize_email, Profile, ProfileUpdate, Role, SignUp, StudentProfile, TrainerProfile,
    UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalAuthService {
    store: Arc<LocalStore>,
}

impl LocalAuthService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Make sure an admin account exists for `email`.
    ///
    /// Returns the existing admin unchanged when already present.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<UserProfile, AppError> {
        let email = normalize_email(email);
        let password_hash = hash_password(password.to_string()).await?;

        self.store
            .update(|db| {
                if let Some(existing) = db.profile_by_email(&email) {
                    if existing.role != Role::Admin {
                        return Err(AppError::Conflict(format!(
                            "{} is registered with another role",
                            email
                        )));
                    }
                    return loaded(db, existing.id);
                }

                let now = Utc::now();
                let id = Uuid::new_v4();
                db.users.push(LocalUser {
                    id,
                    email: email.clone(),
                    password_hash,
                    created_at: now,
                });
                db.profiles.push(Profile {
                    id,
                    email: email.clone(),
                    full_name: "Administrator".to_string(),
                    role: Role::Admin,
                    phone: None,
                    avatar_url: None,
                    created_at: now,
                    updated_at: now,
                });
                tracing::info!(user_id = %id, "Seeded local admin account");
                loaded(db, id)
            })
            .await
    }
}

fn loaded(db: &LocalDatabase, user_id: Uuid) -> Result<UserProfile, AppError> {
    db.user_profile(user_id)
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))
}

/// Claim a student profile a trainer created before the student signed up.
fn claim_invited_student(
    db: &mut LocalDatabase,
    request: &SignUp,
    existing: Profile,
) -> Result<Uuid, AppError> {
    if existing.role != Role::Student || request.role != Role::Student {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let now = Utc::now();
    let already_linked = db
        .student(existing.id)
        .and_then(|s| s.trainer_id)
        .is_some();
    if let (Some(trainer_id), false) = (request.trainer_id, already_linked) {
        db.ensure_student_capacity(trainer_id)?;
    }

    if let Some(profile) = db.profiles.iter_mut().find(|p| p.id == existing.id) {
        profile.full_name = request.full_name.clone();
        if request.phone.is_some() {
            profile.phone = request.phone.clone();
        }
        profile.updated_at = now;
    }

    match db
        .student_profiles
        .iter_mut()
        .find(|s| s.user_id == existing.id)
    {
        Some(student) => {
            if student.trainer_id.is_none() {
                student.trainer_id = request.trainer_id;
                student.updated_at = now;
            }
        }
        None => db
            .student_profiles
            .push(StudentProfile::new(existing.id, request.trainer_id, now)),
    }

    Ok(existing.id)
}

#[async_trait]
impl AuthService for LocalAuthService {
    async fn sign_up(&self, request: SignUp) -> Result<UserProfile, AppError> {
        check_sign_up_role(&request)?;
        let email = normalize_email(&request.email);
        let password_hash = hash_password(request.password.clone()).await?;

        let profile = self
            .store
            .update(|db| {
                if db.user_by_email(&email).is_some() {
                    return Err(AppError::Conflict("Email already registered".to_string()));
                }

                let now = Utc::now();
                let id = match db.profile_by_email(&email).cloned() {
                    Some(existing) => claim_invited_student(db, &request, existing)?,
                    None => {
                        if let Some(trainer_id) = request.trainer_id {
                            db.ensure_student_capacity(trainer_id)?;
                        }
                        let id = Uuid::new_v4();
                        db.profiles.push(Profile {
                            id,
                            email: email.clone(),
                            full_name: request.full_name.clone(),
                            role: request.role,
                            phone: request.phone.clone(),
                            avatar_url: None,
                            created_at: now,
                            updated_at: now,
                        });
                        match request.role {
                            Role::Trainer => db.trainer_profiles.push(TrainerProfile::new(id, now)),
                            Role::Student => db
                                .student_profiles
                                .push(StudentProfile::new(id, request.trainer_id, now)),
                            Role::Admin => {}
                        }
                        id
                    }
                };

                db.users.push(LocalUser {
                    id,
                    email: email.clone(),
                    password_hash,
                    created_at: now,
                });
                loaded(db, id)
            })
            .await?;

        tracing::info!(user_id = %profile.profile.id, role = profile.profile.role.as_str(), "Local account created");
        Ok(profile)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AppError> {
        let email = normalize_email(email);
        let db = self.store.read().await?;

        let user = db
            .user_by_email(&email)
            .ok_or(AppError::InvalidCredentials)?;
        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            return Err(AppError::InvalidCredentials);
        }
        let profile = db
            .user_profile(user.id)
            .ok_or(AppError::InvalidCredentials)?;

        self.store
            .write_session(&StoredSession {
                user_id: user.id,
                email: user.email.clone(),
                role: profile.profile.role,
                access_token: format!("local-{}", Uuid::new_v4().simple()),
                created_at: Utc::now(),
            })
            .await?;

        Ok(profile)
    }

    async fn sign_out(&self, user_id: Uuid) -> Result<(), AppError> {
        match self.store.read_session().await? {
            Some(session) if session.user_id == user_id => self.store.clear_session().await,
            _ => Ok(()),
        }
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        let db = self.store.read().await?;
        loaded(&db, user_id)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, AppError> {
        self.store
            .update(|db| {
                let profile = db
                    .profiles
                    .iter_mut()
                    .find(|p| p.id == user_id)
                    .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;
                update.apply(profile, Utc::now());
                loaded(db, user_id)
            })
            .await
    }
}
