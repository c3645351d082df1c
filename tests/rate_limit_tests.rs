// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request rate limiting through the router.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{send, send_json};
use tower::ServiceExt;
use trainer_hub::config::{Config, RateLimitConfig};

mod common;

/// Limits as deployed behind a proxy that appends the client address.
fn limited_config(max_requests: u32) -> Config {
    Config {
        rate_limit: RateLimitConfig {
            max_requests,
            window_secs: 60,
        },
        trust_proxy: true,
        ..Config::test_default()
    }
}

async fn failed_sign_in(app: &axum::Router, forwarded_for: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/sign-in")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", forwarded_for)
                .body(Body::from(
                    r#"{"email":"victim@example.com","password":"guess-guess"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

async fn health_from(app: &axum::Router, ip: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_requests_over_the_ceiling_get_429() {
    let (app, _) = common::create_test_app_with(limited_config(3)).await;

    for _ in 0..3 {
        assert_eq!(health_from(&app, "203.0.113.7").await, StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another client has its own window.
    assert_eq!(health_from(&app, "198.51.100.2").await, StatusCode::OK);
}

#[tokio::test]
async fn test_limits_are_per_endpoint() {
    let (app, _) = common::create_test_app_with(limited_config(1)).await;

    assert_eq!(health_from(&app, "203.0.113.7").await, StatusCode::OK);
    assert_eq!(
        health_from(&app, "203.0.113.7").await,
        StatusCode::TOO_MANY_REQUESTS
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/sign-out")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_rejections_are_logged() {
    let (app, state) = common::create_test_app_with(limited_config(2)).await;
    let admin = common::sign_in_admin(&app).await;

    for _ in 0..2 {
        let response = send(&app, Method::GET, "/api/me", Some(&admin.token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&app, Method::GET, "/api/me", Some(&admin.token), None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Read the trail directly: the admin's HTTP budget for this window is spent.
    let events = state
        .services
        .security
        .list_events(Some(admin.user_id), 50)
        .await
        .unwrap();
    let limited = events
        .iter()
        .find(|e| e.details["endpoint"] == "GET /api/me")
        .expect("rate_limited event");
    assert_eq!(
        serde_json::to_value(limited.event_type).unwrap(),
        "rate_limited"
    );

    // Other endpoints still answer for the same user.
    let (status, _) = send_json(
        &app,
        Method::GET,
        "/api/admin/trainers",
        Some(&admin.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_for_is_ignored_without_proxy() {
    let config = Config {
        trust_proxy: false,
        ..limited_config(3)
    };
    let (app, _) = common::create_test_app_with(config).await;

    let mut statuses = Vec::new();
    for i in 0..10 {
        statuses.push(failed_sign_in(&app, &format!("198.51.100.{}", i)).await);
    }

    assert_eq!(&statuses[..3], &[StatusCode::UNAUTHORIZED; 3]);
    assert!(statuses[3..]
        .iter()
        .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_client_supplied_hops_do_not_reset_the_limit() {
    let (app, _) = common::create_test_app_with(limited_config(3)).await;

    // The proxy appends the real address after whatever the client sent.
    let mut statuses = Vec::new();
    for i in 0..6 {
        let chain = format!("10.0.0.{}, 203.0.113.7", i);
        statuses.push(failed_sign_in(&app, &chain).await);
    }

    assert_eq!(&statuses[..3], &[StatusCode::UNAUTHORIZED; 3]);
    assert!(statuses[3..]
        .iter()
        .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}
