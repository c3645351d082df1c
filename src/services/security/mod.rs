// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security events, audit trail and LGPD data-subject requests.
//!
//! Erasure removes a user's personal data but keeps security and audit
//! logs, which stay as the record of what happened to the account.

pub mod local;
pub mod rate_limit;
pub mod remote;

pub use local::LocalSecurityService;
pub use rate_limit::RateLimiter;
pub use remote::RemoteSecurityService;

use crate::error::AppError;
use crate::models::{
    AuditLog, LgpdConsent, NewAuditLog, NewConsent, NewSecurityLog, SecurityLog, UserDataExport,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Most log entries returned by one listing.
pub const MAX_LOG_ENTRIES: usize = 500;

#[async_trait]
pub trait SecurityService: Send + Sync {
    async fn log_event(&self, event: NewSecurityLog) -> Result<SecurityLog, AppError>;

    /// Newest first, optionally for one user.
    async fn list_events(
        &self,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SecurityLog>, AppError>;

    async fn record_audit(&self, entry: NewAuditLog) -> Result<AuditLog, AppError>;

    async fn list_audit_logs(&self, limit: usize) -> Result<Vec<AuditLog>, AppError>;

    async fn record_consent(
        &self,
        user_id: Uuid,
        consent: NewConsent,
    ) -> Result<LgpdConsent, AppError>;

    /// Full consent history, oldest first.
    async fn list_consents(&self, user_id: Uuid) -> Result<Vec<LgpdConsent>, AppError>;

    async fn export_user_data(&self, user_id: Uuid) -> Result<UserDataExport, AppError>;

    async fn delete_user_data(&self, user_id: Uuid) -> Result<(), AppError>;
}

/// Log a security event, reporting but not propagating storage failures.
///
/// Request handling should not fail because its audit trail could not be
/// written.
pub async fn record_event(security: &dyn SecurityService, event: NewSecurityLog) {
    let event_type = event.event_type;
    if let Err(e) = security.log_event(event).await {
        tracing::error!(error = %e, event_type = ?event_type, "Failed to record security event");
    }
}

pub(crate) fn user_not_found(user_id: Uuid) -> AppError {
    AppError::NotFound(format!("User {} not found", user_id))
}
