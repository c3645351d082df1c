// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI credit gating through the HTTP surface.

use axum::http::{Method, StatusCode};
use common::{send_json, sign_up};
use serde_json::{json, Value};
use std::sync::Arc;
use trainer_hub::AppState;
use uuid::Uuid;

mod common;

async fn set_credits(state: &Arc<AppState>, trainer_id: Uuid, credits: i64) {
    let store = state.services.local_store.as_ref().unwrap();
    store
        .update(|db| {
            db.trainer_mut(trainer_id)?.ai_credits = credits;
            Ok(())
        })
        .await
        .unwrap();
}

async fn transactions(app: &axum::Router, token: &str) -> Vec<Value> {
    let (status, body) =
        send_json(app, Method::GET, "/api/ai/transactions", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array().unwrap().clone()
}

async fn balance(app: &axum::Router, token: &str) -> i64 {
    let (status, body) = send_json(app, Method::GET, "/api/ai/credits", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["balance"].as_i64().unwrap()
}

#[tokio::test]
async fn test_low_balance_then_upgrade_scenario() {
    let (app, state) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    set_credits(&state, trainer.user_id, 4).await;

    let before = transactions(&app, &trainer.token).await.len();

    // 4 credits cannot pay for a 5-credit diet plan.
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/ai/diet-plans",
        Some(&trainer.token),
        Some(json!({ "goal": "Lose fat" })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_credits");
    assert_eq!(balance(&app, &trainer.token).await, 4);
    assert_eq!(transactions(&app, &trainer.token).await.len(), before);

    // Admin moves the trainer to elite.
    let admin = common::sign_in_admin(&app).await;
    let (status, body) = send_json(
        &app,
        Method::PUT,
        &format!("/api/admin/trainers/{}/plan", trainer.user_id),
        Some(&admin.token),
        Some(json!({ "plan": "elite" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["plan"], "elite");
    assert_eq!(body["ai_credits"], 500);
    assert_eq!(body["max_students"], 100);
    assert_eq!(balance(&app, &trainer.token).await, 500);

    let after_upgrade = transactions(&app, &trainer.token).await.len();

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/ai/diet-plans",
        Some(&trainer.token),
        Some(json!({ "goal": "Lose fat" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["balance"], 495);
    assert_eq!(body["transaction"]["amount"], -5);
    assert_eq!(body["artifact"]["is_ai_generated"], true);
    assert_eq!(balance(&app, &trainer.token).await, 495);

    let ledger = transactions(&app, &trainer.token).await;
    assert_eq!(ledger.len(), after_upgrade + 1);
    assert_eq!(ledger[0]["amount"], -5);
    assert_eq!(ledger[0]["kind"], "usage");
    assert_eq!(ledger[0]["balance_after"], 495);
}

#[tokio::test]
async fn test_plan_change_is_audited() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let admin = common::sign_in_admin(&app).await;

    let (status, _) = send_json(
        &app,
        Method::PUT,
        &format!("/api/admin/trainers/{}/plan", trainer.user_id),
        Some(&admin.token),
        Some(json!({ "plan": "pro" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, logs) = send_json(
        &app,
        Method::GET,
        "/api/admin/audit-logs",
        Some(&admin.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entry = &logs.as_array().unwrap()[0];
    assert_eq!(entry["action"], "update_plan");
    assert_eq!(entry["entity_id"], trainer.user_id.to_string());
    assert_eq!(entry["changes"]["plan"]["from"], "free");
    assert_eq!(entry["changes"]["plan"]["to"], "pro");
}

#[tokio::test]
async fn test_workout_generation_costs_three() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/ai/workout-plans",
        Some(&trainer.token),
        Some(json!({ "goal": "Build strength", "days_per_week": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["balance"], 7);
    assert_eq!(body["transaction"]["amount"], -3);
    assert!(!body["artifact"]["exercises"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_credit_grant() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let admin = common::sign_in_admin(&app).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        &format!("/api/admin/trainers/{}/credits", trainer.user_id),
        Some(&admin.token),
        Some(json!({ "amount": 25, "description": "Support goodwill" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["balance_after"], 35);
    assert_eq!(balance(&app, &trainer.token).await, 35);

    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/api/admin/trainers/{}/credits", trainer.user_id),
        Some(&admin.token),
        Some(json!({ "amount": -1, "kind": "usage", "description": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_grant_is_rejected() {
    let (app, _) = common::create_test_app().await;
    let trainer = sign_up(&app, "coach@example.com", "trainer").await;
    let admin = common::sign_in_admin(&app).await;
    let uri = format!("/api/admin/trainers/{}/credits", trainer.user_id);

    for amount in [i64::MAX, i64::MIN, 100_001] {
        let (status, body) = send_json(
            &app,
            Method::POST,
            &uri,
            Some(&admin.token),
            Some(json!({ "amount": amount, "description": "Typo" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {}", amount);
        assert_eq!(body["error"], "bad_request");
    }

    assert_eq!(balance(&app, &trainer.token).await, 10);
    assert!(transactions(&app, &trainer.token)
        .await
        .iter()
        .all(|tx| tx["description"] != "Typo"));
}
