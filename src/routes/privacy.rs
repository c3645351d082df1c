// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! LGPD consents, data portability and erasure.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::cache;
use crate::container::keys;
use crate::error::Result;
use crate::middleware::auth::{cleared_cookies, AuthUser};
use crate::middleware::rate_limit::ClientIp;
use crate::models::{
    current_consents, ConsentType, LgpdConsent, NewConsent, NewSecurityLog, SecurityEventType,
    SecurityLog, UserDataExport,
};
use crate::services::security::{record_event, MAX_LOG_ENTRIES};
use crate::AppState;

const DEFAULT_LOG_ENTRIES: usize = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/consents", get(list_consents).post(record_consent))
        .route("/api/privacy/export", get(export_data))
        .route("/api/privacy/account", delete(delete_account))
        .route("/api/security/events", get(my_events))
}

/// Current decision per consent type plus the full history.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsentState {
    pub current: BTreeMap<ConsentType, bool>,
    pub history: Vec<LgpdConsent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn resolve(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LOG_ENTRIES)
            .clamp(1, MAX_LOG_ENTRIES)
    }
}

async fn list_consents(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConsentState>> {
    let consents = state
        .cache
        .get_or_fetch(
            &cache::key(keys::SECURITY, format!("{}/consents", user.user_id)),
            || async {
                let history = state.services.security.list_consents(user.user_id).await?;
                Ok(ConsentState {
                    current: current_consents(&history),
                    history,
                })
            },
        )
        .await?;
    Ok(Json(consents))
}

async fn record_consent(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ClientIp(ip): ClientIp,
    Json(mut consent): Json<NewConsent>,
) -> Result<(StatusCode, Json<LgpdConsent>)> {
    consent.validate()?;
    consent.ip_address = ip.clone();

    let consent = state
        .services
        .security
        .record_consent(user.user_id, consent)
        .await?;
    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::ConsentChange, Some(user.user_id))
            .with_ip(ip)
            .with_details(serde_json::json!({
                "consent_type": consent.consent_type,
                "granted": consent.granted,
                "version": consent.version,
            })),
    )
    .await;
    super::invalidate(&state, &[keys::SECURITY]);
    Ok((StatusCode::CREATED, Json(consent)))
}

async fn export_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ClientIp(ip): ClientIp,
) -> Result<Json<UserDataExport>> {
    let export = state
        .services
        .security
        .export_user_data(user.user_id)
        .await?;
    tracing::info!(user_id = %user.user_id, "Personal data exported");
    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::DataExport, Some(user.user_id))
            .with_ip(ip),
    )
    .await;
    super::invalidate(&state, &[keys::SECURITY]);
    Ok(Json(export))
}

/// Erase the caller's personal data and end their session.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
    ClientIp(ip): ClientIp,
) -> Result<(StatusCode, CookieJar)> {
    state
        .services
        .security
        .delete_user_data(user.user_id)
        .await?;
    tracing::info!(user_id = %user.user_id, role = user.role.as_str(), "Account erased");
    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::AccountDeletion, Some(user.user_id))
            .with_ip(ip),
    )
    .await;
    super::invalidate(&state, &keys::ALL);

    let [token_cookie, hint_cookie] = cleared_cookies(&state.config.frontend_url);
    Ok((StatusCode::NO_CONTENT, jar.add(token_cookie).add(hint_cookie)))
}

async fn my_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SecurityLog>>> {
    let events = state
        .services
        .security
        .list_events(Some(user.user_id), query.resolve())
        .await?;
    Ok(Json(events))
}
