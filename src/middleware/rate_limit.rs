// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request rate limiting.

use crate::middleware::auth::{decode_jwt, session_token};
use crate::models::{NewSecurityLog, SecurityEventType};
use crate::services::security::record_event;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts, MatchedPath, Request, State},
    http::{request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Address a request came from.
///
/// This is the socket peer. Behind a trusted proxy (`TRUST_PROXY`) it is the
/// last `X-Forwarded-For` hop instead, the one that proxy appended; earlier
/// hops are supplied by the client and never used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> Self {
        let peer = || {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };
        if trust_proxy {
            Self(last_forwarded_hop(headers).or_else(peer))
        } else {
            Self(peer())
        }
    }
}

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(
            &parts.headers,
            &parts.extensions,
            state.config.trust_proxy,
        ))
    }
}

fn last_forwarded_hop(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(','))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .last()
        .map(str::to_string)
}

fn authenticated_user(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Option<Uuid> {
    let token = session_token(jar, headers)?;
    decode_jwt(&token, &state.config.jwt_signing_key)
        .ok()
        .map(|user| user.user_id)
}

/// Count the request against `user id` (or client address) and endpoint.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let user_id = authenticated_user(&state, &jar, &headers);
    let ClientIp(ip) =
        ClientIp::resolve(&headers, request.extensions(), state.config.trust_proxy);
    let identifier = match (user_id, &ip) {
        (Some(id), _) => id.to_string(),
        (None, Some(ip)) => ip.clone(),
        (None, None) => "anonymous".to_string(),
    };
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let endpoint = format!("{} {}", request.method(), endpoint);

    if let Err(e) = state.rate_limiter.check(&identifier, &endpoint) {
        tracing::warn!(identifier = %identifier, endpoint = %endpoint, "Rate limit exceeded");
        record_event(
            state.services.security.as_ref(),
            NewSecurityLog::new(SecurityEventType::RateLimited, user_id)
                .with_ip(ip)
                .with_details(serde_json::json!({ "endpoint": endpoint })),
        )
        .await;
        return e.into_response();
    }

    next.run(request).await
}
