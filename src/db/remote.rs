// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote relational backend client.
//!
//! Talks to a PostgREST-compatible REST API:
//! - `/rest/v1/{table}` for rows (query-builder calls)
//! - `/functions/v1/{name}` for server-side callable functions
//! - `/auth/v1/...` for password sign-in and admin user management

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use uuid::Uuid;

/// Account returned by the remote auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct PasswordGrantResponse {
    user: RemoteAuthUser,
}

struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RemoteClient {
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Remote database client.
#[derive(Clone)]
pub struct RemoteDb {
    client: Option<Arc<RemoteClient>>,
}

impl RemoteDb {
    /// Create a client for the backend at `base_url` using a service-role key.
    pub fn new(base_url: &str, service_key: &str) -> Self {
        tracing::info!(url = base_url, "Configured remote backend");
        Self {
            client: Some(Arc::new(RemoteClient {
                http: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key: service_key.to_string(),
            })),
        }
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&RemoteClient, AppError> {
        self.client
            .as_deref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Start a query against `table`.
    pub fn from(&self, table: &str) -> Result<QueryBuilder<'_>, AppError> {
        Ok(QueryBuilder {
            client: self.get_client()?,
            table: table.to_string(),
            select: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        })
    }

    /// Call a server-side function with a JSON body.
    pub async fn invoke_function<B, T>(&self, name: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let client = self.get_client()?;
        let url = format!(
            "{}/functions/v1/{}",
            client.base_url,
            urlencoding::encode(name)
        );

        tracing::debug!(function = name, "Invoking remote function");

        let response = client
            .authorized(client.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Function {} request failed: {}", name, e)))?;

        parse_json(check_response(response).await?).await
    }

    // ─── Auth Operations ─────────────────────────────────────────

    /// Verify an email/password pair.
    ///
    /// Any rejection by the auth service maps to the generic
    /// [`AppError::InvalidCredentials`].
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteAuthUser, AppError> {
        let client = self.get_client()?;
        let url = format!("{}/auth/v1/token", client.base_url);

        let response = client
            .http
            .post(&url)
            .query(&[("grant_type", "password")])
            .header("apikey", &client.service_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Auth request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AppError::InvalidCredentials);
        }

        let grant: PasswordGrantResponse = parse_json(check_response(response).await?).await?;
        Ok(grant.user)
    }

    /// Create a confirmed account through the admin API.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteAuthUser, AppError> {
        let client = self.get_client()?;
        let url = format!("{}/auth/v1/admin/users", client.base_url);

        let response = client
            .authorized(client.http.post(&url))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Auth request failed: {}", e)))?;

        match response.status().as_u16() {
            409 | 422 => Err(AppError::Conflict("Email already registered".to_string())),
            _ => parse_json(check_response(response).await?).await,
        }
    }

    /// Remove an account through the admin API.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let client = self.get_client()?;
        let url = format!("{}/auth/v1/admin/users/{}", client.base_url, user_id);

        let response = client
            .authorized(client.http.delete(&url))
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Auth request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_response(response).await?;
        Ok(())
    }
}

/// Query builder for one table.
pub struct QueryBuilder<'a> {
    client: &'a RemoteClient,
    table: String,
    select: String,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<u32>,
}

impl<'a> QueryBuilder<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.select = columns.to_string();
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    pub fn is_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let joined = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({})", joined))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order.push(format!("{}.{}", column, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in the order they are sent.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.select.clone())];
        pairs.extend(self.filters.iter().cloned());
        if !self.order.is_empty() {
            pairs.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.client.base_url, self.table);
        self.client
            .authorized(self.client.http.request(method, &url))
            .query(&self.query_pairs())
    }

    fn backend_error(&self, action: &str, e: reqwest::Error) -> AppError {
        AppError::Backend(format!("{} {} failed: {}", action, self.table, e))
    }

    /// Run a select and deserialize every row.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, AppError> {
        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|e| self.backend_error("select", e))?;
        parse_json(check_response(response).await?).await
    }

    /// Run a select limited to one row.
    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<Option<T>, AppError> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row (object) or many (array), returning the stored rows.
    pub async fn insert<B, T>(self, body: &B) -> Result<Vec<T>, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| self.backend_error("insert into", e))?;
        parse_json(check_response(response).await?).await
    }

    /// Patch every row matching the filters, returning the updated rows.
    pub async fn update<B, T>(self, body: &B) -> Result<Vec<T>, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(reqwest::Method::PATCH)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| self.backend_error("update", e))?;
        parse_json(check_response(response).await?).await
    }

    /// Delete every row matching the filters. Returns the number deleted.
    pub async fn delete(self) -> Result<usize, AppError> {
        let response = self
            .request(reqwest::Method::DELETE)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| self.backend_error("delete from", e))?;
        let rows: Vec<serde_json::Value> = parse_json(check_response(response).await?).await?;
        Ok(rows.len())
    }
}

/// Map non-success statuses to application errors.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        409 => Err(AppError::Conflict(body)),
        404 => Err(AppError::NotFound(body)),
        _ => Err(AppError::Backend(format!("{}: {}", status, body))),
    }
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::Backend(format!("Invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn test_query_pairs_encode_filters() {
        let db = RemoteDb::new("http://localhost:54321/", "key");
        let trainer = Uuid::nil();
        let query = db
            .from("workout_plans")
            .unwrap()
            .select("id,name")
            .eq("trainer_id", trainer)
            .gte("ai_credits", 5)
            .is_in("status", ["scheduled", "completed"])
            .order("created_at", false)
            .limit(10);

        assert_eq!(
            query.query_pairs(),
            vec![
                ("select".to_string(), "id,name".to_string()),
                ("trainer_id".to_string(), format!("eq.{}", trainer)),
                ("ai_credits".to_string(), "gte.5".to_string()),
                ("status".to_string(), "in.(scheduled,completed)".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_client_reports_database_error() {
        let db = RemoteDb::new_mock();
        assert!(matches!(db.from("profiles"), Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_fetch_sends_filters_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/exercises"))
            .and(query_param("name", "eq.Squat"))
            .and(header("apikey", "service-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 1, "name": "Squat" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let rows: Vec<Row> = db
            .from("exercises")
            .unwrap()
            .eq("name", "Squat")
            .fetch()
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![Row {
                id: 1,
                name: "Squat".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_insert_requests_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/exercises"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(serde_json::json!({ "id": 7, "name": "Row" })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!([{ "id": 7, "name": "Row" }])),
            )
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let inserted: Vec<Row> = db
            .from("exercises")
            .unwrap()
            .insert(&Row {
                id: 7,
                name: "Row".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(inserted.len(), 1);
    }

    #[tokio::test]
    async fn test_error_statuses_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");

        let err = db
            .from("profiles")
            .unwrap()
            .insert::<_, serde_json::Value>(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = db
            .from("profiles")
            .unwrap()
            .fetch::<serde_json::Value>()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
    }

    #[tokio::test]
    async fn test_rejected_password_grant_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "invalid_grant" })),
            )
            .mount(&server)
            .await;

        let db = RemoteDb::new(&server.uri(), "service-key");
        let err = db
            .sign_in_with_password("nobody@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
}
