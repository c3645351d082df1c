// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account creation, sign-in and profile management.

pub mod local;
pub mod remote;

pub use local::LocalAuthService;
pub use remote::RemoteAuthService;

use crate::error::AppError;
use crate::models::{ProfileUpdate, Role, SignUp, UserProfile};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account with its profile and role profile.
    async fn sign_up(&self, request: SignUp) -> Result<UserProfile, AppError>;

    /// Verify credentials. Unknown email and wrong password fail identically.
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AppError>;

    async fn sign_out(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, AppError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, AppError>;
}

/// Reject sign-ups that may not be self-served.
pub(crate) fn check_sign_up_role(request: &SignUp) -> Result<(), AppError> {
    if request.role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be created by sign-up".to_string(),
        ));
    }
    if request.role == Role::Trainer && request.trainer_id.is_some() {
        return Err(AppError::BadRequest(
            "Only students can be linked to a trainer".to_string(),
        ));
    }
    Ok(())
}

/// Hash a password with Argon2 off the async executor.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
    })
    .await
    .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
    .map_err(AppError::from)
}

/// Check a password against a stored PHC string.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| anyhow::anyhow!("Stored password hash is invalid: {}", e))?;
        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
    .map_err(AppError::from)
}
