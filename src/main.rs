// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trainer Hub API Server
//!
//! Serves the trainer, student and admin dashboards over JSON, backed by
//! either a local JSON document or a hosted relational backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use trainer_hub::{config::Config, container::ServiceContainer, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired rate-limit windows and cache entries are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = config.backend.as_str(),
        "Starting Trainer Hub API"
    );

    let services = ServiceContainer::from_config(&config).await?;
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        services.ensure_admin(email, password).await?;
    }

    let state = Arc::new(AppState::new(config.clone(), services));
    spawn_purge_task(state.clone());

    let app = trainer_hub::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn spawn_purge_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let windows = state.rate_limiter.purge_expired();
            let entries = state.cache.purge_expired();
            if windows + entries > 0 {
                tracing::debug!(windows, entries, "Purged expired state");
            }
        }
    });
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trainer_hub=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
