// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment intents, local checkout and the signed provider webhook.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use common::{send_json, sign_up};
use serde_json::{json, Value};
use tower::ServiceExt;
use trainer_hub::routes::webhook::{sign, SIGNATURE_HEADER};

mod common;

const SECRET: &[u8] = b"whsec_test";

async fn post_webhook(app: &axum::Router, body: &Value, signature: Option<String>) -> Response {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }
    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

fn signature_for(body: &Value, secret: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let v1 = sign(secret, timestamp, body.to_string().as_bytes()).unwrap();
    format!("t={},v1={}", timestamp, v1)
}

fn succeeded(provider_intent_id: &str) -> Value {
    json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": provider_intent_id } },
    })
}

async fn credit_purchase(app: &axum::Router, token: &str) -> Value {
    let (status, intent) = send_json(
        app,
        Method::POST,
        "/api/payments",
        Some(token),
        Some(json!({ "kind": "credits", "package": "starter" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", intent);
    assert_eq!(intent["status"], "requires_payment");
    assert_eq!(intent["amount_cents"], 1990);
    assert_eq!(intent["currency"], "brl");
    intent
}

async fn balance(app: &axum::Router, token: &str) -> i64 {
    let (_, body) = send_json(app, Method::GET, "/api/ai/credits", Some(token), None).await;
    body["balance"].as_i64().unwrap()
}

#[tokio::test]
async fn test_signed_webhook_fulfils_payment_once() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let intent = credit_purchase(&app, &trainer.token).await;
    let event = succeeded(intent["provider_intent_id"].as_str().unwrap());

    for _ in 0..2 {
        let response = post_webhook(&app, &event, Some(signature_for(&event, SECRET))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(balance(&app, &trainer.token).await, 60);
    let (_, payment) = send_json(
        &app,
        Method::GET,
        &format!("/api/payments/{}", intent["id"].as_str().unwrap()),
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(payment["status"], "succeeded");
}

#[tokio::test]
async fn test_bad_signatures_are_rejected() {
    let (app, state) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let intent = credit_purchase(&app, &trainer.token).await;
    let event = succeeded(intent["provider_intent_id"].as_str().unwrap());

    let response = post_webhook(&app, &event, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_webhook(&app, &event, Some(signature_for(&event, b"whsec_wrong"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stale = format!(
        "t=1000,v1={}",
        sign(SECRET, 1000, event.to_string().as_bytes()).unwrap()
    );
    let response = post_webhook(&app, &event, Some(stale)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(balance(&app, &trainer.token).await, 10);
    let rejected = state
        .services
        .security
        .list_events(None, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| serde_json::to_value(e.event_type).unwrap() == "webhook_rejected")
        .count();
    assert_eq!(rejected, 3);
}

#[tokio::test]
async fn test_unknown_intent_is_acknowledged() {
    let (app, _) = common::create_test_app().await;
    let event = succeeded("pi_unknown");

    let response = post_webhook(&app, &event, Some(signature_for(&event, SECRET))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_failed_payment_is_recorded() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let intent = credit_purchase(&app, &trainer.token).await;
    let event = json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": intent["provider_intent_id"],
            "last_payment_error": { "message": "Your card was declined." },
        }},
    });

    let response = post_webhook(&app, &event, Some(signature_for(&event, SECRET))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, payment) = send_json(
        &app,
        Method::GET,
        &format!("/api/payments/{}", intent["id"].as_str().unwrap()),
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(payment["status"], "failed");
    assert_eq!(payment["failure_reason"], "Your card was declined.");
    assert_eq!(balance(&app, &trainer.token).await, 10);
}

#[tokio::test]
async fn test_local_confirm_is_idempotent() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let intent = credit_purchase(&app, &trainer.token).await;
    let uri = format!("/api/payments/{}/confirm", intent["id"].as_str().unwrap());

    for _ in 0..2 {
        let (status, body) = send_json(&app, Method::POST, &uri, Some(&trainer.token), None).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["status"], "succeeded");
    }
    assert_eq!(balance(&app, &trainer.token).await, 60);

    // Someone else's payment looks missing.
    let other = sign_up(&app, "other@example.com", "trainer").await;
    let (status, _) = send_json(&app, Method::POST, &uri, Some(&other.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_local_subscription_activates_plan() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;

    let (status, checkout) = send_json(
        &app,
        Method::POST,
        "/api/subscription",
        Some(&trainer.token),
        Some(json!({ "plan": "pro" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", checkout);
    assert_eq!(checkout["subscription"]["plan"], "pro");
    assert_eq!(checkout["subscription"]["status"], "active");

    let (_, me) = send_json(&app, Method::GET, "/api/trainer", Some(&trainer.token), None).await;
    assert_eq!(me["plan"], "pro");
    assert_eq!(me["max_students"], 30);
    assert_eq!(balance(&app, &trainer.token).await, 100);

    let (status, cancelled) = send_json(
        &app,
        Method::DELETE,
        "/api/subscription",
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["cancel_at_period_end"], true);

    let (status, current) = send_json(
        &app,
        Method::GET,
        "/api/subscription",
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["plan"], "pro");
}

#[tokio::test]
async fn test_plan_catalog() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;

    let (status, catalog) =
        send_json(&app, Method::GET, "/api/plans", Some(&trainer.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog["plans"].as_array().unwrap().len(), 3);
    assert_eq!(catalog["plans"][1]["plan"], "pro");
    assert_eq!(catalog["plans"][1]["price_cents"], 4990);
    assert_eq!(catalog["credit_packages"][2]["credits"], 400);
    assert_eq!(catalog["feature_costs"][0]["credits"], 5);
}

#[tokio::test]
async fn test_lapsed_subscription_refreshes_cached_plan() {
    let (app, state) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/subscription",
        Some(&trainer.token),
        Some(json!({ "plan": "pro" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send_json(
        &app,
        Method::DELETE,
        "/api/subscription",
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Warm the cached reads with the pro plan.
    let (_, me) = send_json(&app, Method::GET, "/api/trainer", Some(&trainer.token), None).await;
    assert_eq!(me["plan"], "pro");
    assert_eq!(balance(&app, &trainer.token).await, 100);

    let store = state.services.local_store.as_ref().unwrap();
    store
        .update(|db| {
            for sub in db.subscriptions.iter_mut() {
                sub.current_period_end = chrono::Utc::now() - chrono::Duration::minutes(1);
            }
            Ok(())
        })
        .await
        .unwrap();

    let (status, current) = send_json(
        &app,
        Method::GET,
        "/api/subscription",
        Some(&trainer.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["status"], "canceled");

    let (_, me) = send_json(&app, Method::GET, "/api/trainer", Some(&trainer.token), None).await;
    assert_eq!(me["plan"], "free");
    assert_eq!(me["max_students"], 5);
    assert_eq!(balance(&app, &trainer.token).await, 10);
}
