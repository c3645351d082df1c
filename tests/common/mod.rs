// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use trainer_hub::config::Config;
use trainer_hub::container::ServiceContainer;
use trainer_hub::db::LocalStore;
use trainer_hub::middleware::auth::create_jwt;
use trainer_hub::models::Role;
use trainer_hub::routes::create_router;
use trainer_hub::services::ai::TemplateGenerator;
use trainer_hub::AppState;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// Create a test app on an in-memory local store with a seeded admin.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(config: Config) -> (Router, Arc<AppState>) {
    let store = Arc::new(LocalStore::in_memory());
    let services = ServiceContainer::local(store, Arc::new(TemplateGenerator));
    services
        .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("seed admin");

    let state = Arc::new(AppState::new(config, services));
    (create_router(state.clone()), state)
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: Uuid, role: Role, signing_key: &[u8]) -> String {
    create_jwt(user_id, role, signing_key).expect("create jwt")
}

/// Send a JSON request, optionally authenticated with a bearer token.
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Like [`send`], returning the status and parsed JSON body (`Null` if empty).
#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send(app, method, uri, token, body).await;
    let status = response.status();
    (status, body_json(response).await)
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// A signed-in account: its bearer token and profile id.
#[allow(dead_code)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
}

#[allow(dead_code)]
pub async fn sign_up(app: &Router, email: &str, role: &str) -> Session {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/auth/sign-up",
        None,
        Some(serde_json::json!({
            "email": email,
            "password": "correct-horse",
            "full_name": "Test User",
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "sign-up failed: {}", body);
    session_from(&body)
}

#[allow(dead_code)]
pub async fn sign_in(app: &Router, email: &str, password: &str) -> Session {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/auth/sign-in",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "sign-in failed: {}", body);
    session_from(&body)
}

#[allow(dead_code)]
pub async fn sign_in_admin(app: &Router) -> Session {
    sign_in(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

fn session_from(body: &Value) -> Session {
    Session {
        token: body["token"].as_str().unwrap().to_string(),
        user_id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
    }
}

/// Link a new student to the trainer and return the student's id.
#[allow(dead_code)]
pub async fn add_student(app: &Router, trainer: &Session, email: &str) -> Uuid {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/students",
        Some(&trainer.token),
        Some(serde_json::json!({ "email": email, "full_name": "Student" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "add student failed: {}", body);
    body["profile"]["id"].as_str().unwrap().parse().unwrap()
}
