// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.

use crate::error::AppError;
use crate::models::Role;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Session token cookie (HttpOnly).
pub const TOKEN_COOKIE: &str = "trainer_hub_token";
/// Script-readable hint that a session exists.
pub const LOGGED_IN_COOKIE: &str = "trainer_hub_logged_in";

/// Session lifetime.
pub const SESSION_DAYS: i64 = 7;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (profile id)
    pub sub: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Fail with 403 unless the user has one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            return Ok(());
        }
        Err(AppError::Forbidden(format!(
            "{} accounts cannot use this endpoint",
            self.role.as_str()
        )))
    }

    pub fn require_trainer(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Trainer])
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin])
    }

    /// Trainer id for trainer endpoints; admins may act for any trainer.
    pub fn trainer_scope(&self, requested: Option<Uuid>) -> Result<Uuid, AppError> {
        match (self.role, requested) {
            (Role::Trainer, None) => Ok(self.user_id),
            (Role::Trainer, Some(id)) if id == self.user_id => Ok(id),
            (Role::Admin, Some(id)) => Ok(id),
            _ => Err(AppError::Forbidden(
                "Not allowed to act for this trainer".to_string(),
            )),
        }
    }
}

/// Token from the session cookie, else the bearer header.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn decode_jwt(token: &str, signing_key: &[u8]) -> Result<AuthUser, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| AppError::InvalidToken)?;
    let user_id = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        role: token_data.claims.role,
    })
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&jar, request.headers()).ok_or(AppError::Unauthorized)?;
    let auth_user = decode_jwt(&token, &state.config.jwt_signing_key)?;
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_jwt(user_id: Uuid, role: Role, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let exp = now + SESSION_DAYS * 24 * 60 * 60;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: usize::try_from(now)?,
        exp: usize::try_from(exp)?,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Session cookies for `token`. Secure unless the frontend is plain http.
pub fn session_cookies(token: String, frontend_url: &str) -> [Cookie<'static>; 2] {
    let secure = frontend_url.starts_with("https://");
    let max_age = time::Duration::days(SESSION_DAYS);

    let token_cookie = Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build();
    let hint_cookie = Cookie::build((LOGGED_IN_COOKIE, "1"))
        .path("/")
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build();
    [token_cookie, hint_cookie]
}

/// Expired copies of the session cookies, with matching attributes.
pub fn cleared_cookies(frontend_url: &str) -> [Cookie<'static>; 2] {
    session_cookies(String::new(), frontend_url).map(|mut cookie| {
        cookie.set_max_age(time::Duration::ZERO);
        cookie
    })
}
