// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security events, audit trail and LGPD consent records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    CreditTransaction, DietPlan, PaymentIntent, Profile, StudentProfile, Subscription,
    TrainerProfile, TrainingSession, WorkoutPlan,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    SignIn,
    SignInFailed,
    SignUp,
    SignOut,
    RateLimited,
    DataExport,
    AccountDeletion,
    ConsentChange,
    WebhookRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Security event (`security_logs` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityLog {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSecurityLog {
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
}

impl NewSecurityLog {
    pub fn new(event_type: SecurityEventType, user_id: Option<Uuid>) -> Self {
        let severity = match event_type {
            SecurityEventType::SignInFailed
            | SecurityEventType::RateLimited
            | SecurityEventType::WebhookRejected => Severity::Warning,
            SecurityEventType::AccountDeletion => Severity::Critical,
            _ => Severity::Info,
        };
        Self {
            user_id,
            event_type,
            severity,
            ip_address: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn into_log(self, now: DateTime<Utc>) -> SecurityLog {
        SecurityLog {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            event_type: self.event_type,
            severity: self.severity,
            ip_address: self.ip_address,
            details: self.details,
            created_at: now,
        }
    }
}

/// Administrative change record (`audit_logs` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub changes: serde_json::Value,
}

impl NewAuditLog {
    pub fn into_log(self, now: DateTime<Utc>) -> AuditLog {
        AuditLog {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            changes: self.changes,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    Terms,
    Privacy,
    Marketing,
    DataProcessing,
    HealthData,
}

/// Consent decision (`lgpd_consents` table). History is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LgpdConsent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub consent_type: ConsentType,
    pub granted: bool,
    /// Version of the policy text the user saw
    pub version: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewConsent {
    pub consent_type: ConsentType,
    pub granted: bool,
    #[validate(length(min = 1, max = 20))]
    pub version: String,
    #[serde(skip)]
    pub ip_address: Option<String>,
}

impl NewConsent {
    pub fn into_consent(self, user_id: Uuid, now: DateTime<Utc>) -> LgpdConsent {
        LgpdConsent {
            id: Uuid::new_v4(),
            user_id,
            consent_type: self.consent_type,
            granted: self.granted,
            version: self.version,
            ip_address: self.ip_address,
            created_at: now,
        }
    }
}

/// Everything stored about one user, for data portability requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDataExport {
    pub profile: Profile,
    pub trainer: Option<TrainerProfile>,
    pub student: Option<StudentProfile>,
    pub sessions: Vec<TrainingSession>,
    pub workout_plans: Vec<WorkoutPlan>,
    pub diet_plans: Vec<DietPlan>,
    pub credit_transactions: Vec<CreditTransaction>,
    pub subscriptions: Vec<Subscription>,
    pub payments: Vec<PaymentIntent>,
    pub consents: Vec<LgpdConsent>,
    pub security_logs: Vec<SecurityLog>,
    pub exported_at: DateTime<Utc>,
}

/// Latest decision per consent type.
pub fn current_consents(history: &[LgpdConsent]) -> BTreeMap<ConsentType, bool> {
    let mut sorted: Vec<&LgpdConsent> = history.iter().collect();
    sorted.sort_by_key(|c| c.created_at);
    sorted
        .into_iter()
        .map(|c| (c.consent_type, c.granted))
        .collect()
}
