// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment provider webhook.
//!
//! Requests carry a `t=<unix>,v1=<hex>` signature header: HMAC-SHA256 of
//! `"{t}.{raw body}"` keyed with the webhook secret. Signatures older than
//! [`TOLERANCE_SECS`] are rejected to limit replays.

use crate::container::keys;
use crate::error::{AppError, Result};
use crate::middleware::rate_limit::ClientIp;
use crate::models::{NewSecurityLog, PaymentEvent, SecurityEventType};
use crate::services::security::record_event;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const TOLERANCE_SECS: i64 = 300;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/payments", post(handle_event))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the `v1` signature for `timestamp` and `body`.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("HMAC init failed: {}", e))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `body` at time `now` (unix seconds).
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &[u8],
    now: i64,
) -> std::result::Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = sign(secret, timestamp, body).map_err(|_| SignatureError::Malformed)?;
    // The provider may send several v1 signatures during secret rotation.
    let matched = signatures
        .iter()
        .any(|sig| bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    id: String,
    #[serde(default)]
    last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    #[serde(default)]
    message: Option<String>,
}

/// Map a provider event to a billing event. `None` for event types we
/// do not act on.
fn parse_event(body: &[u8]) -> Result<Option<PaymentEvent>> {
    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;
    let object = event.data.object;

    let parsed = match event.event_type.as_str() {
        "payment_intent.succeeded" => Some(PaymentEvent::IntentSucceeded {
            provider_intent_id: object.id,
        }),
        "payment_intent.payment_failed" => Some(PaymentEvent::IntentFailed {
            provider_intent_id: object.id,
            reason: object
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Payment failed".to_string()),
        }),
        "customer.subscription.deleted" => Some(PaymentEvent::SubscriptionEnded {
            provider_subscription_id: object.id,
        }),
        other => {
            tracing::debug!(event_type = other, "Ignoring webhook event type");
            None
        }
    };
    Ok(parsed)
}

async fn reject(state: &AppState, ip: Option<String>, reason: &str) {
    tracing::warn!(reason, "Security Alert: payment webhook rejected");
    record_event(
        state.services.security.as_ref(),
        NewSecurityLog::new(SecurityEventType::WebhookRejected, None)
            .with_ip(ip)
            .with_details(serde_json::json!({ "reason": reason })),
    )
    .await;
}

/// Handle a provider notification (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        reject(&state, ip, "webhook secret not configured").await;
        return Err(AppError::Forbidden(
            "Payment webhook is not configured".to_string(),
        ));
    };

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_signature(header, &body, secret.as_bytes(), now) {
        reject(&state, ip, &e.to_string()).await;
        return Err(AppError::BadRequest("Invalid webhook signature".to_string()));
    }

    let Some(event) = parse_event(&body)? else {
        return Ok(StatusCode::OK);
    };
    tracing::info!(event = ?event, "Payment webhook received");

    state.services.payments.apply_event(event).await?;
    super::invalidate(
        &state,
        &[keys::PAYMENTS, keys::TRAINERS, keys::AI, keys::AUTH],
    );
    Ok(StatusCode::OK)
}
