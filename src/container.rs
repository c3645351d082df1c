// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service container.
//!
//! One implementation per service key, picked when the container is built.
//! Handlers only see the traits.

use crate::config::{BackendKind, Config};
use crate::db::{LocalStore, RemoteDb};
use crate::error::AppError;
use crate::services::ai::generator;
use crate::services::{
    AiService, AuthService, ContentGenerator, LocalAiService, LocalAuthService,
    LocalPaymentService, LocalSecurityService, LocalTrainerService, LocalWorkoutService,
    PaymentService, PriceIds, RemoteAiService, RemoteAuthService, RemotePaymentService,
    RemoteSecurityService, RemoteTrainerService, RemoteWorkoutService, SecurityService,
    TrainerService, WorkoutService,
};
use std::sync::Arc;

/// Service keys, also used as query cache prefixes.
pub mod keys {
    pub const AUTH: &str = "auth";
    pub const TRAINERS: &str = "trainers";
    pub const WORKOUTS: &str = "workouts";
    pub const AI: &str = "ai";
    pub const PAYMENTS: &str = "payments";
    pub const SECURITY: &str = "security";

    pub const ALL: [&str; 6] = [AUTH, TRAINERS, WORKOUTS, AI, PAYMENTS, SECURITY];
}

#[derive(Clone)]
pub struct ServiceContainer {
    pub backend: BackendKind,
    pub auth: Arc<dyn AuthService>,
    pub trainers: Arc<dyn TrainerService>,
    pub workouts: Arc<dyn WorkoutService>,
    pub ai: Arc<dyn AiService>,
    pub payments: Arc<dyn PaymentService>,
    pub security: Arc<dyn SecurityService>,
    /// Present in local mode only (admin export, admin bootstrap)
    pub local_store: Option<Arc<LocalStore>>,
}

impl ServiceContainer {
    /// Every service on the local JSON document.
    pub fn local(store: Arc<LocalStore>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            backend: BackendKind::Local,
            auth: Arc::new(LocalAuthService::new(store.clone())),
            trainers: Arc::new(LocalTrainerService::new(store.clone())),
            workouts: Arc::new(LocalWorkoutService::new(store.clone())),
            ai: Arc::new(LocalAiService::new(store.clone(), generator)),
            payments: Arc::new(LocalPaymentService::new(store.clone())),
            security: Arc::new(LocalSecurityService::new(store.clone())),
            local_store: Some(store),
        }
    }

    /// Every service on the hosted backend.
    pub fn remote(db: RemoteDb, generator: Arc<dyn ContentGenerator>, prices: PriceIds) -> Self {
        Self {
            backend: BackendKind::Remote,
            auth: Arc::new(RemoteAuthService::new(db.clone())),
            trainers: Arc::new(RemoteTrainerService::new(db.clone())),
            workouts: Arc::new(RemoteWorkoutService::new(db.clone())),
            ai: Arc::new(RemoteAiService::new(db.clone(), generator)),
            payments: Arc::new(RemotePaymentService::new(db.clone(), prices)),
            security: Arc::new(RemoteSecurityService::new(db)),
            local_store: None,
        }
    }

    /// Build the container selected by `config.backend`.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let generator = generator::from_config(config);
        let container = match config.backend {
            BackendKind::Local => {
                let store = LocalStore::open(&config.data_dir).await?;
                Self::local(Arc::new(store), generator)
            }
            BackendKind::Remote => {
                let (Some(url), Some(key)) = (&config.remote_url, &config.remote_service_key)
                else {
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "Remote backend selected without REMOTE_URL and REMOTE_SERVICE_KEY"
                    )));
                };
                Self::remote(
                    RemoteDb::new(url, key),
                    generator,
                    PriceIds::from_config(config),
                )
            }
        };
        tracing::info!(
            backend = container.backend.as_str(),
            services = ?keys::ALL,
            "Service container ready"
        );
        Ok(container)
    }

    /// Seed the bootstrap admin account (local mode only).
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<(), AppError> {
        let Some(store) = &self.local_store else {
            tracing::debug!("Admin bootstrap skipped for remote backend");
            return Ok(());
        };
        LocalAuthService::new(store.clone())
            .ensure_admin(email, password)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, SignUp};
    use crate::services::ai::TemplateGenerator;

    #[tokio::test]
    async fn test_local_services_share_one_store() {
        let store = Arc::new(LocalStore::in_memory());
        let container = ServiceContainer::local(store, Arc::new(TemplateGenerator));

        let profile = container
            .auth
            .sign_up(SignUp {
                email: "ana@example.com".to_string(),
                password: "password123".to_string(),
                full_name: "Ana".to_string(),
                role: Role::Trainer,
                phone: None,
                trainer_id: None,
            })
            .await
            .unwrap();

        let credits = container.ai.get_credits(profile.profile.id).await.unwrap();
        assert_eq!(credits.balance, 10);
        assert_eq!(container.backend, BackendKind::Local);
    }

    #[tokio::test]
    async fn test_remote_container_has_no_local_store() {
        let container = ServiceContainer::remote(
            RemoteDb::new_mock(),
            Arc::new(TemplateGenerator),
            PriceIds::default(),
        );
        assert!(container.local_store.is_none());
        assert!(container.ensure_admin("a@example.com", "pw").await.is_ok());
    }
}
