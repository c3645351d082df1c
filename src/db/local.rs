// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local JSON document store.
//!
//! The whole database is one JSON document stored under [`DB_KEY`] in a
//! small key-value store (one `<key>.json` file per key, or memory for
//! tests). The current session lives under [`SESSION_KEY`].
//!
//! Every mutation is a read-modify-write of the full document. Mutations
//! are serialized by an async mutex and files are replaced by
//! write-then-rename, so concurrent requests never clobber each other and a
//! crash never leaves a half-written document.

use crate::error::AppError;
use crate::models::{
    AuditLog, CreditTransaction, DietPlan, Exercise, Ingredient, LgpdConsent, Meal,
    PaymentIntent, Profile, Role, SecurityLog, StudentProfile, Subscription, TrainerProfile,
    TrainingSession, UserProfile, WorkoutPlan, WorkoutPlanExercise,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Storage key of the database document.
pub const DB_KEY: &str = "trainer_hub_db";
/// Storage key of the current session.
pub const SESSION_KEY: &str = "trainer_hub_session";

/// Security log entries kept locally.
pub const SECURITY_LOG_CAP: usize = 1000;
/// Audit log entries kept locally.
pub const AUDIT_LOG_CAP: usize = 1000;

/// Credentials for a local account. Never exported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalUser {
    pub id: Uuid,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Session persisted under [`SESSION_KEY`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Placeholder token; real sessions are JWTs issued by the HTTP layer
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

/// The full local database document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalDatabase {
    pub users: Vec<LocalUser>,
    pub profiles: Vec<Profile>,
    pub trainer_profiles: Vec<TrainerProfile>,
    pub student_profiles: Vec<StudentProfile>,
    pub sessions: Vec<TrainingSession>,
    pub exercises: Vec<Exercise>,
    pub workout_plans: Vec<WorkoutPlan>,
    pub workout_plan_exercises: Vec<WorkoutPlanExercise>,
    pub diet_plans: Vec<DietPlan>,
    pub meals: Vec<Meal>,
    pub ingredients: Vec<Ingredient>,
    pub credit_transactions: Vec<CreditTransaction>,
    pub subscriptions: Vec<Subscription>,
    pub payment_intents: Vec<PaymentIntent>,
    pub security_logs: Vec<SecurityLog>,
    pub audit_logs: Vec<AuditLog>,
    pub lgpd_consents: Vec<LgpdConsent>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl LocalDatabase {
    pub fn user_by_email(&self, email: &str) -> Option<&LocalUser> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn profile(&self, user_id: Uuid) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == user_id)
    }

    pub fn profile_by_email(&self, email: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.email == email)
    }

    pub fn trainer(&self, user_id: Uuid) -> Option<&TrainerProfile> {
        self.trainer_profiles.iter().find(|t| t.user_id == user_id)
    }

    pub fn trainer_mut(&mut self, user_id: Uuid) -> Result<&mut TrainerProfile, AppError> {
        self.trainer_profiles
            .iter_mut()
            .find(|t| t.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", user_id)))
    }

    pub fn student(&self, user_id: Uuid) -> Option<&StudentProfile> {
        self.student_profiles.iter().find(|s| s.user_id == user_id)
    }

    pub fn students_of(&self, trainer_id: Uuid) -> impl Iterator<Item = &StudentProfile> {
        self.student_profiles
            .iter()
            .filter(move |s| s.trainer_id == Some(trainer_id))
    }

    /// Whether `student_id` is currently linked to `trainer_id`.
    pub fn is_linked(&self, trainer_id: Uuid, student_id: Uuid) -> bool {
        self.student(student_id)
            .is_some_and(|s| s.trainer_id == Some(trainer_id))
    }

    /// Profile joined with its role-specific record.
    pub fn user_profile(&self, user_id: Uuid) -> Option<UserProfile> {
        let profile = self.profile(user_id)?.clone();
        Some(UserProfile {
            trainer: self.trainer(user_id).cloned(),
            student: self.student(user_id).cloned(),
            profile,
        })
    }

    /// Fail when the trainer cannot take another student.
    pub fn ensure_student_capacity(&self, trainer_id: Uuid) -> Result<(), AppError> {
        let trainer = self
            .trainer(trainer_id)
            .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))?;
        let linked = self.students_of(trainer_id).count();
        if linked >= trainer.max_students as usize {
            return Err(AppError::PlanLimitReached(format!(
                "The {} plan allows {} students",
                trainer.plan, trainer.max_students
            )));
        }
        Ok(())
    }

    /// Drop the oldest log entries beyond the local caps.
    fn truncate_logs(&mut self) {
        truncate_front(&mut self.security_logs, SECURITY_LOG_CAP);
        truncate_front(&mut self.audit_logs, AUDIT_LOG_CAP);
    }
}

fn truncate_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// Run `f` against the in-memory map without holding the guard across an await.
fn memory_access<T>(
    items: &std::sync::Mutex<HashMap<String, String>>,
    f: impl FnOnce(&mut HashMap<String, String>) -> T,
) -> Result<T, AppError> {
    let mut map = items
        .lock()
        .map_err(|_| AppError::Database("Memory store poisoned".to_string()))?;
    Ok(f(&mut map))
}

enum Backing {
    Directory(PathBuf),
    Memory(std::sync::Mutex<HashMap<String, String>>),
}

/// Key-value backed store holding the [`LocalDatabase`] document.
pub struct LocalStore {
    backing: Backing,
    lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Open a store persisting into `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Database(format!(
                "Failed to create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        tracing::info!(path = %dir.display(), "Opened local data store");

        Ok(Self {
            backing: Backing::Directory(dir),
            lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create a store that lives only in memory (tests, demos).
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(std::sync::Mutex::new(HashMap::new())),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    // ─── Key-Value Primitives ──────────────────────────────────────

    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        match &self.backing {
            Backing::Directory(dir) => {
                let path = dir.join(format!("{}.json", key));
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => Ok(Some(contents)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(AppError::Database(format!(
                        "Failed to read {}: {}",
                        path.display(),
                        e
                    ))),
                }
            }
            Backing::Memory(items) => memory_access(items, |map| map.get(key).cloned()),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), AppError> {
        match &self.backing {
            Backing::Directory(dir) => {
                let path = dir.join(format!("{}.json", key));
                let tmp = dir.join(format!("{}.json.tmp", key));
                tokio::fs::write(&tmp, value.as_bytes())
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to write {}: {}", key, e)))?;
                tokio::fs::rename(&tmp, &path)
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to replace {}: {}", key, e)))
            }
            Backing::Memory(items) => memory_access(items, |map| {
                map.insert(key.to_string(), value);
            }),
        }
    }

    async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        match &self.backing {
            Backing::Directory(dir) => {
                let path = dir.join(format!("{}.json", key));
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(AppError::Database(format!(
                        "Failed to remove {}: {}",
                        key, e
                    ))),
                }
            }
            Backing::Memory(items) => memory_access(items, |map| {
                map.remove(key);
            }),
        }
    }

    // ─── Document Operations ───────────────────────────────────────

    async fn load(&self) -> Result<LocalDatabase, AppError> {
        match self.get_item(DB_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AppError::Database(format!("Corrupt local database: {}", e))),
            None => Ok(LocalDatabase::default()),
        }
    }

    async fn save(&self, db: &LocalDatabase) -> Result<(), AppError> {
        let raw = serde_json::to_string(db)
            .map_err(|e| AppError::Database(format!("Failed to serialize database: {}", e)))?;
        self.set_item(DB_KEY, raw).await
    }

    /// Snapshot of the whole document.
    pub async fn read(&self) -> Result<LocalDatabase, AppError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Read-modify-write the document.
    ///
    /// Nothing is written when `f` fails, so a rejected operation leaves the
    /// stored state untouched.
    pub async fn update<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut LocalDatabase) -> Result<T, AppError>,
    {
        let _guard = self.lock.lock().await;
        let mut db = self.load().await?;
        let output = f(&mut db)?;
        db.truncate_logs();
        db.last_updated = Some(Utc::now());
        self.save(&db).await?;
        Ok(output)
    }

    // ─── Session Operations ────────────────────────────────────────

    pub async fn read_session(&self) -> Result<Option<StoredSession>, AppError> {
        match self.get_item(SESSION_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AppError::Database(format!("Corrupt session: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn write_session(&self, session: &StoredSession) -> Result<(), AppError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| AppError::Database(format!("Failed to serialize session: {}", e)))?;
        self.set_item(SESSION_KEY, raw).await
    }

    pub async fn clear_session(&self) -> Result<(), AppError> {
        self.remove_item(SESSION_KEY).await
    }

    /// Export every entity array (credentials excluded) as one JSON object.
    pub async fn export(&self) -> Result<serde_json::Value, AppError> {
        let db = self.read().await?;
        let mut value = serde_json::to_value(&db)
            .map_err(|e| AppError::Database(format!("Failed to serialize export: {}", e)))?;
        if let Some(object) = value.as_object_mut() {
            object.remove("users");
            object.insert(
                "exportedAt".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSecurityLog, SecurityEventType};

    const ENTITY_KEYS: [&str; 16] = [
        "profiles",
        "trainer_profiles",
        "student_profiles",
        "sessions",
        "exercises",
        "workout_plans",
        "workout_plan_exercises",
        "diet_plans",
        "meals",
        "ingredients",
        "credit_transactions",
        "subscriptions",
        "payment_intents",
        "security_logs",
        "audit_logs",
        "lgpd_consents",
    ];

    #[tokio::test]
    async fn test_export_contains_every_entity_array_when_empty() {
        let store = LocalStore::in_memory();
        let export = store.export().await.unwrap();

        for key in ENTITY_KEYS {
            assert_eq!(export[key], serde_json::json!([]), "missing array {}", key);
        }
        assert!(export.get("users").is_none());
        assert!(export.get("lastUpdated").is_some());
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let store = LocalStore::in_memory();
        let result: Result<(), AppError> = store
            .update(|db| {
                db.security_logs.push(
                    NewSecurityLog::new(SecurityEventType::SignIn, None).into_log(Utc::now()),
                );
                Err(AppError::BadRequest("rejected".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.read().await.unwrap().security_logs.is_empty());
    }

    #[tokio::test]
    async fn test_logs_are_capped_to_most_recent() {
        let store = LocalStore::in_memory();
        store
            .update(|db| {
                for i in 0..(SECURITY_LOG_CAP + 5) {
                    db.security_logs.push(
                        NewSecurityLog::new(SecurityEventType::SignIn, None)
                            .with_details(serde_json::json!({ "n": i }))
                            .into_log(Utc::now()),
                    );
                }
                Ok(())
            })
            .await
            .unwrap();

        let db = store.read().await.unwrap();
        assert_eq!(db.security_logs.len(), SECURITY_LOG_CAP);
        assert_eq!(db.security_logs[0].details["n"], 5);
    }

    #[tokio::test]
    async fn test_directory_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = LocalStore::open(dir.path()).await.unwrap();
        store
            .update(|db| {
                db.security_logs.push(
                    NewSecurityLog::new(SecurityEventType::SignUp, None).into_log(Utc::now()),
                );
                Ok(())
            })
            .await
            .unwrap();
        drop(store);

        let reopened = LocalStore::open(dir.path()).await.unwrap();
        let db = reopened.read().await.unwrap();
        assert_eq!(db.security_logs.len(), 1);
        assert!(db.last_updated.is_some());
        assert!(dir.path().join("trainer_hub_db.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trainer_hub_db.json"), "{not json").unwrap();

        let store = LocalStore::open(dir.path()).await.unwrap();
        let err = store.read().await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = LocalStore::in_memory();
        assert!(store.read_session().await.unwrap().is_none());

        let session = StoredSession {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            role: Role::Trainer,
            access_token: "local-token".to_string(),
            created_at: Utc::now(),
        };
        store.write_session(&session).await.unwrap();
        assert_eq!(store.read_session().await.unwrap(), Some(session));

        store.clear_session().await.unwrap();
        assert!(store.read_session().await.unwrap().is_none());
    }
}
