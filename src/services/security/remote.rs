// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::{user_not_found, SecurityService};
use crate::db::{tables, RemoteDb};
use crate::error::AppError;
use crate::models::{
    AuditLog, CreditTransaction, DietPlan, LgpdConsent, NewAuditLog, NewConsent, NewSecurityLog,
    PaymentIntent, Profile, SecurityLog, StudentProfile, Subscription, TrainerProfile,
    TrainingSession, UserDataExport, WorkoutPlan,
};
use crate::services::workout::remote::{delete_diet_plan_rows, delete_workout_plan_rows};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct IdRow {
    id: Uuid,
}

pub struct RemoteSecurityService {
    db: RemoteDb,
}

impl RemoteSecurityService {
    pub fn new(db: RemoteDb) -> Self {
        Self { db }
    }

    async fn profile(&self, user_id: Uuid) -> Result<Profile, AppError> {
        self.db
            .from(tables::PROFILES)?
            .eq("id", user_id)
            .fetch_one()
            .await?
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn rows_for<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        user_id: Uuid,
    ) -> Result<Vec<T>, AppError> {
        self.db
            .from(table)?
            .eq(column, user_id)
            .order("created_at", true)
            .fetch()
            .await
    }

    /// Rows where the user is either the trainer or the student.
    async fn participant_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        user_id: Uuid,
    ) -> Result<Vec<T>, AppError> {
        let mut rows: Vec<T> = self.rows_for(table, "trainer_id", user_id).await?;
        rows.extend(self.rows_for::<T>(table, "student_id", user_id).await?);
        Ok(rows)
    }

    async fn participant_ids(&self, table: &str, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let mut ids = Vec::new();
        for column in ["trainer_id", "student_id"] {
            let rows: Vec<IdRow> = self
                .db
                .from(table)?
                .select("id")
                .eq(column, user_id)
                .fetch()
                .await?;
            ids.extend(rows.into_iter().map(|r| r.id));
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn delete_where(&self, table: &str, column: &str, user_id: Uuid) -> Result<usize, AppError> {
        self.db.from(table)?.eq(column, user_id).delete().await
    }
}

#[async_trait]
impl SecurityService for RemoteSecurityService {
    async fn log_event(&self, event: NewSecurityLog) -> Result<SecurityLog, AppError> {
        let log = event.into_log(Utc::now());
        self.db
            .from(tables::SECURITY_LOGS)?
            .insert::<_, SecurityLog>(&log)
            .await?;
        Ok(log)
    }

    async fn list_events(
        &self,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SecurityLog>, AppError> {
        let mut query = self
            .db
            .from(tables::SECURITY_LOGS)?
            .order("created_at", false)
            .limit(u32::try_from(limit).unwrap_or(u32::MAX));
        if let Some(user_id) = user_id {
            query = query.eq("user_id", user_id);
        }
        query.fetch().await
    }

    async fn record_audit(&self, entry: NewAuditLog) -> Result<AuditLog, AppError> {
        let log = entry.into_log(Utc::now());
        self.db
            .from(tables::AUDIT_LOGS)?
            .insert::<_, AuditLog>(&log)
            .await?;
        Ok(log)
    }

    async fn list_audit_logs(&self, limit: usize) -> Result<Vec<AuditLog>, AppError> {
        self.db
            .from(tables::AUDIT_LOGS)?
            .order("created_at", false)
            .limit(u32::try_from(limit).unwrap_or(u32::MAX))
            .fetch()
            .await
    }

    async fn record_consent(
        &self,
        user_id: Uuid,
        consent: NewConsent,
    ) -> Result<LgpdConsent, AppError> {
        self.profile(user_id).await?;
        let consent = consent.into_consent(user_id, Utc::now());
        self.db
            .from(tables::LGPD_CONSENTS)?
            .insert::<_, LgpdConsent>(&consent)
            .await?;
        Ok(consent)
    }

    async fn list_consents(&self, user_id: Uuid) -> Result<Vec<LgpdConsent>, AppError> {
        self.rows_for(tables::LGPD_CONSENTS, "user_id", user_id)
            .await
    }

    async fn export_user_data(&self, user_id: Uuid) -> Result<UserDataExport, AppError> {
        let profile = self.profile(user_id).await?;
        let trainer: Option<TrainerProfile> = self
            .db
            .from(tables::TRAINER_PROFILES)?
            .eq("user_id", user_id)
            .fetch_one()
            .await?;
        let student: Option<StudentProfile> = self
            .db
            .from(tables::STUDENT_PROFILES)?
            .eq("user_id", user_id)
            .fetch_one()
            .await?;

        // Row sets are independent; fetch them concurrently.
        let (
            sessions,
            workout_plans,
            diet_plans,
            credit_transactions,
            subscriptions,
            payments,
            consents,
            security_logs,
        ): (
            Vec<TrainingSession>,
            Vec<WorkoutPlan>,
            Vec<DietPlan>,
            Vec<CreditTransaction>,
            Vec<Subscription>,
            Vec<PaymentIntent>,
            Vec<LgpdConsent>,
            Vec<SecurityLog>,
        ) = futures_util::try_join!(
            self.participant_rows(tables::SESSIONS, user_id),
            self.participant_rows(tables::WORKOUT_PLANS, user_id),
            self.participant_rows(tables::DIET_PLANS, user_id),
            self.rows_for(tables::CREDIT_TRANSACTIONS, "trainer_id", user_id),
            self.rows_for(tables::SUBSCRIPTIONS, "trainer_id", user_id),
            self.rows_for(tables::PAYMENT_INTENTS, "trainer_id", user_id),
            self.list_consents(user_id),
            self.rows_for(tables::SECURITY_LOGS, "user_id", user_id),
        )?;

        Ok(UserDataExport {
            profile,
            trainer,
            student,
            sessions,
            workout_plans,
            diet_plans,
            credit_transactions,
            subscriptions,
            payments,
            consents,
            security_logs,
            exported_at: Utc::now(),
        })
    }

    async fn delete_user_data(&self, user_id: Uuid) -> Result<(), AppError> {
        self.profile(user_id).await?;

        for plan_id in self.participant_ids(tables::WORKOUT_PLANS, user_id).await? {
            delete_workout_plan_rows(&self.db, plan_id).await?;
        }
        for plan_id in self.participant_ids(tables::DIET_PLANS, user_id).await? {
            delete_diet_plan_rows(&self.db, plan_id).await?;
        }

        self.delete_where(tables::SESSIONS, "trainer_id", user_id).await?;
        self.delete_where(tables::SESSIONS, "student_id", user_id).await?;
        for table in [
            tables::CREDIT_TRANSACTIONS,
            tables::SUBSCRIPTIONS,
            tables::PAYMENT_INTENTS,
        ] {
            self.delete_where(table, "trainer_id", user_id).await?;
        }
        self.delete_where(tables::LGPD_CONSENTS, "user_id", user_id)
            .await?;

        let now = Utc::now();
        self.db
            .from(tables::STUDENT_PROFILES)?
            .eq("trainer_id", user_id)
            .update::<_, serde_json::Value>(&serde_json::json!({
                "trainer_id": null,
                "updated_at": now,
            }))
            .await?;
        self.db
            .from(tables::EXERCISES)?
            .eq("created_by", user_id)
            .update::<_, serde_json::Value>(&serde_json::json!({ "created_by": null }))
            .await?;

        self.delete_where(tables::STUDENT_PROFILES, "user_id", user_id)
            .await?;
        self.delete_where(tables::TRAINER_PROFILES, "user_id", user_id)
            .await?;
        self.delete_where(tables::PROFILES, "id", user_id).await?;
        self.db.delete_user(user_id).await?;

        tracing::info!(user_id = %user_id, "User data erased");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(id: Uuid) -> Profile {
        let now = Utc::now();
        Profile {
            id,
            email: "ana@example.com".to_string(),
            full_name: "Ana".to_string(),
            role: Role::Trainer,
            phone: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_erasure_removes_account_and_unlinks_students() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![profile(user_id)]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/security_logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/auth/v1/admin/users/{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/student_profiles"))
            .and(query_param("trainer_id", format!("eq.{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/exercises"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let service = RemoteSecurityService::new(RemoteDb::new(&server.uri(), "service-key"));
        service.delete_user_data(user_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_be_exported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let service = RemoteSecurityService::new(RemoteDb::new(&server.uri(), "service-key"));
        let err = service.export_user_data(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
