// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password authentication and the current user's profile.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::cache;
use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::auth::{
    cleared_cookies, create_jwt, decode_jwt, session_cookies, session_token, AuthUser,
};
use crate::middleware::rate_limit::ClientIp;
use crate::models::{NewSecurityLog, ProfileUpdate, SecurityEventType, SignUp, UserProfile};
use crate::services::security::record_event;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
}

/// Routes for the signed-in user; mounted behind the auth middleware.
pub fn profile_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me", get(get_me).put(update_me))
}

#[derive(Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

/// Session token plus the signed-in profile.
#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserProfile,
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: UserProfile,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let token = create_jwt(user.profile.id, user.profile.role, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let [token_cookie, hint_cookie] = session_cookies(token.clone(), &state.config.frontend_url);
    let jar = jar.add(token_cookie).add(hint_cookie);
    Ok((jar, Json(SessionResponse { token, user })))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ClientIp(ip): ClientIp,
    Json(request): Json<SignUp>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>)> {
    request.validate()?;
    let user = state.services.auth.sign_up(request).await?;

    tracing::info!(user_id = %user.profile.id, role = user.profile.role.as_str(), "User signed up");
    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::SignUp, Some(user.profile.id))
            .with_ip(ip),
    )
    .await;
    super::invalidate(&state, &[keys::TRAINERS]);

    let (jar, body) = start_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ClientIp(ip): ClientIp,
    Json(request): Json<SignInRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    // Malformed input fails the same way as a wrong password.
    if request.validate().is_err() {
        return Err(AppError::InvalidCredentials);
    }

    let user = match state
        .services
        .auth
        .sign_in(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(AppError::InvalidCredentials) => {
            record_event(
                state.services.security.as_ref(),
                NewSecurityLog::new(SecurityEventType::SignInFailed, None)
                    .with_ip(ip)
                    .with_details(serde_json::json!({ "email": request.email })),
            )
            .await;
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::SignIn, Some(user.profile.id)).with_ip(ip),
    )
    .await;

    start_session(&state, jar, user)
}

/// Sign out. Works without a valid session so stale cookies can be cleared.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(StatusCode, CookieJar)> {
    let user = session_token(&jar, &headers)
        .and_then(|token| decode_jwt(&token, &state.config.jwt_signing_key).ok());
    if let Some(user) = user {
        state.services.auth.sign_out(user.user_id).await?;
        record_event(
            state.services.security.as_ref(),
            NewSecurityLog::new(SecurityEventType::SignOut, Some(user.user_id)),
        )
        .await;
    }

    let [token_cookie, hint_cookie] = cleared_cookies(&state.config.frontend_url);
    Ok((StatusCode::NO_CONTENT, jar.add(token_cookie).add(hint_cookie)))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfile>> {
    let profile = state
        .cache
        .get_or_fetch(&cache::key(keys::AUTH, user.user_id), || {
            state.services.auth.get_profile(user.user_id)
        })
        .await?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    update.validate()?;
    let profile = state
        .services
        .auth
        .update_profile(user.user_id, update)
        .await?;
    super::invalidate(&state, &[keys::AUTH, keys::TRAINERS]);
    Ok(Json(profile))
}
