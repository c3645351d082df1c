//! Application configuration loaded from environment variables.
//!
//! Provider credentials (remote backend key, AI key, payment webhook secret)
//! are optional: without them the server runs in local-only mode.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which persistence backend the service container is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Single JSON document on local disk.
    Local,
    /// Hosted PostgREST-style relational service.
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            _ => Err(ConfigError::Invalid("DATA_BACKEND", s.to_string())),
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Persistence ---
    pub backend: BackendKind,
    /// Directory holding the local JSON documents
    pub data_dir: PathBuf,
    /// Base URL of the hosted backend (remote mode)
    pub remote_url: Option<String>,
    /// Service-role key for the hosted backend (remote mode)
    pub remote_service_key: Option<String>,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Payment provider webhook signing secret
    pub payment_webhook_secret: Option<String>,

    // --- AI provider ---
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_base_url: String,

    // --- Payment provider price ids ---
    pub price_id_pro: Option<String>,
    pub price_id_elite: Option<String>,

    pub rate_limit: RateLimitConfig,
    /// Running behind a reverse proxy that appends the client address to
    /// `X-Forwarded-For`
    pub trust_proxy: bool,
    /// Query cache entry lifetime
    pub cache_ttl_secs: u64,

    /// Bootstrap admin account (local mode)
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend = match env::var("DATA_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => BackendKind::Local,
        };

        let remote_url = optional("REMOTE_URL").map(|url| url.trim_end_matches('/').to_string());
        let remote_service_key = optional("REMOTE_SERVICE_KEY");

        if backend == BackendKind::Remote {
            if remote_url.is_none() {
                return Err(ConfigError::Missing("REMOTE_URL"));
            }
            if remote_service_key.is_none() {
                return Err(ConfigError::Missing("REMOTE_SERVICE_KEY"));
            }
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080)?,
            backend,
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            remote_url,
            remote_service_key,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            payment_webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            ai_api_key: optional("AI_API_KEY"),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ai_base_url: env::var("AI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            price_id_pro: optional("PRICE_ID_PRO"),
            price_id_elite: optional("PRICE_ID_ELITE"),
            rate_limit: RateLimitConfig {
                max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", 100)?,
                window_secs: parse_or("RATE_LIMIT_WINDOW_SECS", 60)?,
            },
            trust_proxy: parse_or("TRUST_PROXY", false)?,
            cache_ttl_secs: parse_or("CACHE_TTL_SECS", 30)?,
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }

    /// Config for tests: local backend, no external providers.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            backend: BackendKind::Local,
            data_dir: PathBuf::from("./data"),
            remote_url: None,
            remote_service_key: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            payment_webhook_secret: Some("whsec_test".to_string()),
            ai_api_key: None,
            ai_model: "gpt-4o-mini".to_string(),
            ai_base_url: "https://api.openai.com/v1".to_string(),
            price_id_pro: None,
            price_id_elite: None,
            rate_limit: RateLimitConfig::default(),
            trust_proxy: false,
            cache_ttl_secs: 30,
            admin_email: None,
            admin_password: None,
        }
    }
}

/// Read an env var, treating empty values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
