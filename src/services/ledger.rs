// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credit balance and plan changes shared by the AI and payment services.
//!
//! Every balance change appends exactly one ledger entry. Locally the change
//! and the entry are written in one locked update; remotely the balance is
//! updated with a compare-and-swap on `ai_credits`, retried a few times.

use crate::db::{tables, LocalDatabase, RemoteDb};
use crate::error::AppError;
use crate::models::{AiFeature, CreditTransaction, PlanTier, TrainerProfile, TransactionKind};
use chrono::Utc;
use uuid::Uuid;

/// Compare-and-swap attempts before giving up on a contended balance.
pub const CAS_ATTEMPTS: usize = 5;

/// A signed change to a trainer's balance.
#[derive(Debug, Clone)]
pub struct CreditChange {
    pub amount: i64,
    pub kind: TransactionKind,
    pub feature: Option<AiFeature>,
    pub description: String,
}

impl CreditChange {
    pub fn usage(feature: AiFeature) -> Self {
        Self {
            amount: -feature.cost(),
            kind: TransactionKind::Usage,
            feature: Some(feature),
            description: feature.label().to_string(),
        }
    }

    pub fn refund(feature: AiFeature) -> Self {
        Self {
            amount: feature.cost(),
            kind: TransactionKind::Refund,
            feature: Some(feature),
            description: format!("Refund: {}", feature.label()),
        }
    }

    pub fn grant(amount: i64, kind: TransactionKind, description: impl Into<String>) -> Self {
        Self {
            amount,
            kind,
            feature: None,
            description: description.into(),
        }
    }

    /// New balance, or an error when a debit would overdraw.
    fn apply_to(&self, balance: i64) -> Result<i64, AppError> {
        let next = balance
            .checked_add(self.amount)
            .ok_or_else(|| AppError::BadRequest("Credit balance out of range".to_string()))?;
        if self.amount < 0 && next < 0 {
            return Err(AppError::InsufficientCredits {
                required: self.amount.checked_neg().unwrap_or(i64::MAX),
                available: balance,
            });
        }
        Ok(next)
    }

    fn into_transaction(self, trainer_id: Uuid, balance_after: i64) -> CreditTransaction {
        CreditTransaction::new(
            trainer_id,
            self.amount,
            self.kind,
            self.feature,
            self.description,
            balance_after,
        )
    }
}

/// Fail unless the trainer can afford `feature` right now.
pub fn check_affordable(trainer: &TrainerProfile, feature: AiFeature) -> Result<(), AppError> {
    if trainer.ai_credits < feature.cost() {
        return Err(AppError::InsufficientCredits {
            required: feature.cost(),
            available: trainer.ai_credits,
        });
    }
    Ok(())
}

// ─── Local Document ──────────────────────────────────────────────

/// Apply a balance change inside a local update.
pub fn apply_local(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    change: CreditChange,
) -> Result<CreditTransaction, AppError> {
    let trainer = db.trainer_mut(trainer_id)?;
    let balance = change.apply_to(trainer.ai_credits)?;
    trainer.ai_credits = balance;
    trainer.updated_at = Utc::now();

    let transaction = change.into_transaction(trainer_id, balance);
    db.credit_transactions.push(transaction.clone());
    Ok(transaction)
}

/// Reset the trainer to `plan`'s defaults inside a local update.
pub fn change_plan_local(
    db: &mut LocalDatabase,
    trainer_id: Uuid,
    plan: PlanTier,
) -> Result<TrainerProfile, AppError> {
    let trainer = db.trainer_mut(trainer_id)?;
    let delta = trainer.apply_plan(plan, Utc::now());
    let updated = trainer.clone();

    if delta != 0 {
        db.credit_transactions.push(plan_reset(&updated, delta));
    }
    Ok(updated)
}

fn plan_reset(trainer: &TrainerProfile, delta: i64) -> CreditTransaction {
    CreditChange::grant(
        delta,
        TransactionKind::PlanReset,
        format!("{} plan credit allotment", trainer.plan),
    )
    .into_transaction(trainer.user_id, trainer.ai_credits)
}

// ─── Remote Tables ───────────────────────────────────────────────

pub async fn fetch_trainer(db: &RemoteDb, trainer_id: Uuid) -> Result<TrainerProfile, AppError> {
    db.from(tables::TRAINER_PROFILES)?
        .eq("user_id", trainer_id)
        .fetch_one()
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))
}

/// Apply a balance change with a compare-and-swap on the stored balance.
pub async fn apply_remote(
    db: &RemoteDb,
    trainer_id: Uuid,
    change: CreditChange,
) -> Result<CreditTransaction, AppError> {
    for attempt in 1..=CAS_ATTEMPTS {
        let trainer = fetch_trainer(db, trainer_id).await?;
        let balance = change.apply_to(trainer.ai_credits)?;

        let swapped: Vec<TrainerProfile> = db
            .from(tables::TRAINER_PROFILES)?
            .eq("user_id", trainer_id)
            .eq("ai_credits", trainer.ai_credits)
            .update(&serde_json::json!({
                "ai_credits": balance,
                "updated_at": Utc::now(),
            }))
            .await?;

        if swapped.is_empty() {
            tracing::debug!(
                trainer_id = %trainer_id,
                attempt,
                "Credit balance changed concurrently, retrying"
            );
            continue;
        }

        let transaction = change.into_transaction(trainer_id, balance);
        let recorded = match db.from(tables::CREDIT_TRANSACTIONS) {
            Ok(query) => query.insert::<_, CreditTransaction>(&transaction).await,
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            restore_balance(db, trainer_id, balance, trainer.ai_credits, &e).await;
            return Err(e);
        }
        return Ok(transaction);
    }

    tracing::warn!(trainer_id = %trainer_id, "Credit balance update kept conflicting");
    Err(AppError::Conflict(
        "Credit balance is changing too quickly, try again".to_string(),
    ))
}

/// Undo a swapped balance whose ledger entry could not be written.
///
/// The reversal is itself a compare-and-swap, so a balance that moved again
/// in between is left alone and reported.
async fn restore_balance(
    db: &RemoteDb,
    trainer_id: Uuid,
    swapped_to: i64,
    original: i64,
    cause: &AppError,
) {
    tracing::warn!(
        trainer_id = %trainer_id,
        error = %cause,
        "Recording credit transaction failed, restoring balance"
    );
    let restored: Result<Vec<TrainerProfile>, AppError> = match db.from(tables::TRAINER_PROFILES) {
        Ok(query) => {
            query
                .eq("user_id", trainer_id)
                .eq("ai_credits", swapped_to)
                .update(&serde_json::json!({
                    "ai_credits": original,
                    "updated_at": Utc::now(),
                }))
                .await
        }
        Err(e) => Err(e),
    };
    match restored {
        Ok(rows) if !rows.is_empty() => {}
        Ok(_) => tracing::error!(
            trainer_id = %trainer_id,
            expected = swapped_to,
            "Balance changed before it could be restored"
        ),
        Err(e) => tracing::error!(
            trainer_id = %trainer_id,
            error = %e,
            "Restoring credit balance failed"
        ),
    }
}

/// Reset the trainer to `plan`'s defaults in the remote tables.
pub async fn change_plan_remote(
    db: &RemoteDb,
    trainer_id: Uuid,
    plan: PlanTier,
) -> Result<TrainerProfile, AppError> {
    let mut trainer = fetch_trainer(db, trainer_id).await?;
    let delta = trainer.apply_plan(plan, Utc::now());

    db.from(tables::TRAINER_PROFILES)?
        .eq("user_id", trainer_id)
        .update::<_, TrainerProfile>(&serde_json::json!({
            "plan": trainer.plan,
            "max_students": trainer.max_students,
            "ai_credits": trainer.ai_credits,
            "updated_at": trainer.updated_at,
        }))
        .await?;

    if delta != 0 {
        db.from(tables::CREDIT_TRANSACTIONS)?
            .insert::<_, CreditTransaction>(&plan_reset(&trainer, delta))
            .await?;
    }
    Ok(trainer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn db_with_trainer(credits: i64) -> (LocalDatabase, Uuid) {
        let mut db = LocalDatabase::default();
        let trainer_id = Uuid::new_v4();
        let mut trainer = TrainerProfile::new(trainer_id, Utc::now());
        trainer.ai_credits = credits;
        db.trainer_profiles.push(trainer);
        (db, trainer_id)
    }

    #[test]
    fn test_usage_debits_and_records_balance() {
        let (mut db, trainer_id) = db_with_trainer(10);

        let tx = apply_local(&mut db, trainer_id, CreditChange::usage(AiFeature::DietPlan)).unwrap();

        assert_eq!(tx.amount, -5);
        assert_eq!(tx.balance_after, 5);
        assert_eq!(db.trainer(trainer_id).unwrap().ai_credits, 5);
        assert_eq!(db.credit_transactions.len(), 1);
    }

    #[test]
    fn test_overdraw_is_rejected_without_entry() {
        let (mut db, trainer_id) = db_with_trainer(4);

        let err = apply_local(&mut db, trainer_id, CreditChange::usage(AiFeature::DietPlan))
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::InsufficientCredits {
                required: 5,
                available: 4
            }
        ));
        assert_eq!(db.trainer(trainer_id).unwrap().ai_credits, 4);
        assert!(db.credit_transactions.is_empty());
    }

    #[test]
    fn test_plan_change_records_reset_delta() {
        let (mut db, trainer_id) = db_with_trainer(4);

        let trainer = change_plan_local(&mut db, trainer_id, PlanTier::Elite).unwrap();

        assert_eq!(trainer.ai_credits, 500);
        assert_eq!(trainer.max_students, 100);
        let tx = &db.credit_transactions[0];
        assert_eq!(tx.kind, TransactionKind::PlanReset);
        assert_eq!(tx.amount, 496);
        assert_eq!(tx.balance_after, 500);
    }

    #[test]
    fn test_grant_overflow_is_rejected_without_entry() {
        let (mut db, trainer_id) = db_with_trainer(10);

        let err = apply_local(
            &mut db,
            trainer_id,
            CreditChange::grant(i64::MAX, TransactionKind::Purchase, "Huge grant"),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(db.trainer(trainer_id).unwrap().ai_credits, 10);
        assert!(db.credit_transactions.is_empty());
    }

    #[test]
    fn test_most_negative_debit_does_not_overflow() {
        let (mut db, trainer_id) = db_with_trainer(10);

        let err = apply_local(
            &mut db,
            trainer_id,
            CreditChange::grant(i64::MIN, TransactionKind::Purchase, "Bogus"),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::InsufficientCredits {
                required: i64::MAX,
                available: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_remote_debit_is_restored_when_ledger_insert_fails() {
        let server = MockServer::start().await;
        let trainer_id = Uuid::new_v4();
        let trainer = TrainerProfile::new(trainer_id, Utc::now());
        let mut after = trainer.clone();
        after.ai_credits = 7;

        Mock::given(method("GET"))
            .and(path("/rest/v1/trainer_profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![trainer.clone()]))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/trainer_profiles"))
            .and(query_param("ai_credits", "eq.10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![after]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/credit_transactions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/trainer_profiles"))
            .and(query_param("ai_credits", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![trainer]))
            .expect(1)
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let result =
            apply_remote(&db, trainer_id, CreditChange::usage(AiFeature::WorkoutPlan)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_remote_cas_gives_up_after_repeated_conflicts() {
        let server = MockServer::start().await;
        let trainer_id = Uuid::new_v4();
        let trainer = TrainerProfile::new(trainer_id, Utc::now());

        Mock::given(method("GET"))
            .and(path("/rest/v1/trainer_profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![trainer]))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/trainer_profiles"))
            .and(query_param("ai_credits", "eq.10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(CAS_ATTEMPTS as u64)
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let err = apply_remote(&db, trainer_id, CreditChange::usage(AiFeature::WorkoutPlan))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_remote_debit_appends_transaction() {
        let server = MockServer::start().await;
        let trainer_id = Uuid::new_v4();
        let trainer = TrainerProfile::new(trainer_id, Utc::now());
        let mut after = trainer.clone();
        after.ai_credits = 7;

        Mock::given(method("GET"))
            .and(path("/rest/v1/trainer_profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![trainer]))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/trainer_profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![after]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/credit_transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let tx = apply_remote(&db, trainer_id, CreditChange::usage(AiFeature::WorkoutPlan))
            .await
            .unwrap();
        assert_eq!(tx.amount, -3);
        assert_eq!(tx.balance_after, 7);
    }
}
