// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Accounts managed by the remote auth service and `profiles` tables.

use super::{check_sign_up_role, AuthService};
use crate::db::{tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    normalize_email, Profile, ProfileUpdate, Role, SignUp, StudentProfile, TrainerProfile,
    UserProfile,
};
use crate::services::trainer::remote::ensure_student_capacity;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

pub struct RemoteAuthService {
    db: RemoteDb,
}

impl RemoteAuthService {
    pub fn new(db: RemoteDb) -> Self {
        Self { db }
    }

    async fn insert_profiles(&self, request: &SignUp, id: Uuid, email: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let profile = Profile {
            id,
            email: email.to_string(),
            full_name: request.full_name.clone(),
            role: request.role,
            phone: request.phone.clone(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        self.db
            .from(tables::PROFILES)?
            .insert::<_, Profile>(&profile)
            .await?;

        match request.role {
            Role::Trainer => {
                self.db
                    .from(tables::TRAINER_PROFILES)?
                    .insert::<_, TrainerProfile>(&TrainerProfile::new(id, now))
                    .await?;
            }
            Role::Student => {
                self.db
                    .from(tables::STUDENT_PROFILES)?
                    .insert::<_, StudentProfile>(&StudentProfile::new(id, request.trainer_id, now))
                    .await?;
            }
            Role::Admin => {}
        }
        Ok(())
    }
}

/// Load a profile with its role-specific record.
pub(crate) async fn fetch_user_profile(db: &RemoteDb, user_id: Uuid) -> Result<UserProfile, AppError> {
    let profile: Profile = db
        .from(tables::PROFILES)?
        .eq("id", user_id)
        .fetch_one()
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;

    let trainer = match profile.role {
        Role::Trainer => {
            db.from(tables::TRAINER_PROFILES)?
                .eq("user_id", user_id)
                .fetch_one()
                .await?
        }
        _ => None,
    };
    let student = match profile.role {
        Role::Student => {
            db.from(tables::STUDENT_PROFILES)?
                .eq("user_id", user_id)
                .fetch_one()
                .await?
        }
        _ => None,
    };

    Ok(UserProfile {
        profile,
        trainer,
        student,
    })
}

#[async_trait]
impl AuthService for RemoteAuthService {
    async fn sign_up(&self, request: SignUp) -> Result<UserProfile, AppError> {
        check_sign_up_role(&request)?;
        let email = normalize_email(&request.email);
        if let Some(trainer_id) = request.trainer_id {
            ensure_student_capacity(&self.db, trainer_id).await?;
        }

        let user = self.db.create_user(&email, &request.password).await?;

        if let Err(e) = self.insert_profiles(&request, user.id, &email).await {
            tracing::warn!(user_id = %user.id, error = %e, "Profile creation failed, removing account");
            if let Err(cleanup) = self.db.delete_user(user.id).await {
                tracing::error!(user_id = %user.id, error = %cleanup, "Failed to remove orphaned account");
            }
            return Err(e);
        }

        tracing::info!(user_id = %user.id, role = request.role.as_str(), "Remote account created");
        fetch_user_profile(&self.db, user.id).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AppError> {
        let email = normalize_email(email);
        let user = self.db.sign_in_with_password(&email, password).await?;
        fetch_user_profile(&self.db, user.id).await
    }

    async fn sign_out(&self, user_id: Uuid) -> Result<(), AppError> {
        // Sessions are stateless JWTs; nothing is stored remotely.
        tracing::debug!(user_id = %user_id, "Remote sign-out");
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        fetch_user_profile(&self.db, user_id).await
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, AppError> {
        let mut profile: Profile = self
            .db
            .from(tables::PROFILES)?
            .eq("id", user_id)
            .fetch_one()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;
        update.apply(&mut profile, Utc::now());

        self.db
            .from(tables::PROFILES)?
            .eq("id", user_id)
            .update::<_, Profile>(&serde_json::json!({
                "full_name": profile.full_name,
                "phone": profile.phone,
                "avatar_url": profile.avatar_url,
                "updated_at": profile.updated_at,
            }))
            .await?;

        fetch_user_profile(&self.db, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sign_in_loads_trainer_profile() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "remote-token",
                "user": { "id": user_id, "email": "ana@example.com" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", format!("eq.{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": user_id,
                "email": "ana@example.com",
                "full_name": "Ana",
                "role": "trainer",
                "created_at": now,
                "updated_at": now,
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/trainer_profiles"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([TrainerProfile::new(user_id, now)])),
            )
            .mount(&server)
            .await;

        let service = RemoteAuthService::new(RemoteDb::new(&server.uri(), "service-key"));
        let profile = service.sign_in("ana@example.com", "password123").await.unwrap();

        assert_eq!(profile.profile.id, user_id);
        assert_eq!(profile.trainer.unwrap().ai_credits, 10);
        assert!(profile.student.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_remote_sign_up_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "msg": "A user with this email address has already been registered"
            })))
            .mount(&server)
            .await;

        let service = RemoteAuthService::new(RemoteDb::new(&server.uri(), "service-key"));
        let err = service
            .sign_up(SignUp {
                email: "ana@example.com".to_string(),
                password: "password123".to_string(),
                full_name: "Ana".to_string(),
                role: Role::Trainer,
                phone: None,
                trainer_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }
}
