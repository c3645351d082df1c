// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{user_not_found, SecurityService};
use crate::db::{LocalDatabase, LocalStore};
use crate::error::AppError;
use crate::models::{
    AuditLog, LgpdConsent, NewAuditLog, NewConsent, NewSecurityLog, SecurityLog, UserDataExport,
};
use crate::services::workout::local::{remove_diet_plan, remove_workout_plan};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct LocalSecurityService {
    store: Arc<LocalStore>,
}

impl LocalSecurityService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

fn newest<T: Clone>(items: &[T], limit: usize, keep: impl Fn(&T) -> bool) -> Vec<T> {
    // Logs are appended in time order.
    items
        .iter()
        .rev()
        .filter(|item| keep(item))
        .take(limit)
        .cloned()
        .collect()
}

fn erase(db: &mut LocalDatabase, user_id: Uuid) {
    let now = Utc::now();

    let workout_plans: Vec<Uuid> = db
        .workout_plans
        .iter()
        .filter(|p| p.visible_to(user_id))
        .map(|p| p.id)
        .collect();
    for plan_id in workout_plans {
        remove_workout_plan(db, plan_id);
    }
    let diet_plans: Vec<Uuid> = db
        .diet_plans
        .iter()
        .filter(|p| p.visible_to(user_id))
        .map(|p| p.id)
        .collect();
    for plan_id in diet_plans {
        remove_diet_plan(db, plan_id);
    }

    db.sessions
        .retain(|s| s.trainer_id != user_id && s.student_id != user_id);
    db.credit_transactions.retain(|t| t.trainer_id != user_id);
    db.subscriptions.retain(|s| s.trainer_id != user_id);
    db.payment_intents.retain(|p| p.trainer_id != user_id);
    db.lgpd_consents.retain(|c| c.user_id != user_id);

    // Students of a deleted trainer stay, unlinked.
    for student in db
        .student_profiles
        .iter_mut()
        .filter(|s| s.trainer_id == Some(user_id))
    {
        student.trainer_id = None;
        student.updated_at = now;
    }
    for exercise in db
        .exercises
        .iter_mut()
        .filter(|e| e.created_by == Some(user_id))
    {
        exercise.created_by = None;
    }

    db.student_profiles.retain(|s| s.user_id != user_id);
    db.trainer_profiles.retain(|t| t.user_id != user_id);
    db.profiles.retain(|p| p.id != user_id);
    db.users.retain(|u| u.id != user_id);
}

#[async_trait]
impl SecurityService for LocalSecurityService {
    async fn log_event(&self, event: NewSecurityLog) -> Result<SecurityLog, AppError> {
        let log = event.into_log(Utc::now());
        self.store
            .update(|db| {
                db.security_logs.push(log.clone());
                Ok(())
            })
            .await?;
        Ok(log)
    }

    async fn list_events(
        &self,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SecurityLog>, AppError> {
        let db = self.store.read().await?;
        Ok(newest(&db.security_logs, limit, |log| {
            user_id.is_none() || log.user_id == user_id
        }))
    }

    async fn record_audit(&self, entry: NewAuditLog) -> Result<AuditLog, AppError> {
        let log = entry.into_log(Utc::now());
        self.store
            .update(|db| {
                db.audit_logs.push(log.clone());
                Ok(())
            })
            .await?;
        Ok(log)
    }

    async fn list_audit_logs(&self, limit: usize) -> Result<Vec<AuditLog>, AppError> {
        let db = self.store.read().await?;
        Ok(newest(&db.audit_logs, limit, |_| true))
    }

    async fn record_consent(
        &self,
        user_id: Uuid,
        consent: NewConsent,
    ) -> Result<LgpdConsent, AppError> {
        self.store
            .update(|db| {
                if db.profile(user_id).is_none() {
                    return Err(user_not_found(user_id));
                }
                let consent = consent.into_consent(user_id, Utc::now());
                db.lgpd_consents.push(consent.clone());
                Ok(consent)
            })
            .await
    }

    async fn list_consents(&self, user_id: Uuid) -> Result<Vec<LgpdConsent>, AppError> {
        let db = self.store.read().await?;
        Ok(db
            .lgpd_consents
            .into_iter()
            .filter(|c| c.user_id == user_id)
            .collect())
    }

    async fn export_user_data(&self, user_id: Uuid) -> Result<UserDataExport, AppError> {
        let db = self.store.read().await?;
        let profile = db
            .profile(user_id)
            .cloned()
            .ok_or_else(|| user_not_found(user_id))?;

        Ok(UserDataExport {
            profile,
            trainer: db.trainer(user_id).cloned(),
            student: db.student(user_id).cloned(),
            sessions: db
                .sessions
                .iter()
                .filter(|s| s.trainer_id == user_id || s.student_id == user_id)
                .cloned()
                .collect(),
            workout_plans: db
                .workout_plans
                .iter()
                .filter(|p| p.visible_to(user_id))
                .cloned()
                .collect(),
            diet_plans: db
                .diet_plans
                .iter()
                .filter(|p| p.visible_to(user_id))
                .cloned()
                .collect(),
            credit_transactions: db
                .credit_transactions
                .iter()
                .filter(|t| t.trainer_id == user_id)
                .cloned()
                .collect(),
            subscriptions: db
                .subscriptions
                .iter()
                .filter(|s| s.trainer_id == user_id)
                .cloned()
                .collect(),
            payments: db
                .payment_intents
                .iter()
                .filter(|p| p.trainer_id == user_id)
                .cloned()
                .collect(),
            consents: db
                .lgpd_consents
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect(),
            security_logs: db
                .security_logs
                .iter()
                .filter(|l| l.user_id == Some(user_id))
                .cloned()
                .collect(),
            exported_at: Utc::now(),
        })
    }

    async fn delete_user_data(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store
            .update(|db| {
                if db.profile(user_id).is_none() {
                    return Err(user_not_found(user_id));
                }
                erase(db, user_id);
                Ok(())
            })
            .await?;

        if let Some(session) = self.store.read_session().await? {
            if session.user_id == user_id {
                self.store.clear_session().await?;
            }
        }
        tracing::info!(user_id = %user_id, "User data erased");
        Ok(())
    }
}
