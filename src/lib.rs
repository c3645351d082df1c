// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trainer Hub: backend for personal trainers and their students.
//!
//! Trainers manage students, sessions, workout and diet plans; paid tiers
//! raise student limits and the AI credit allotment used for generated
//! plans. Every service runs on either a local JSON document or a hosted
//! relational backend.

pub mod cache;
pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use cache::QueryCache;
use config::Config;
use container::ServiceContainer;
use services::RateLimiter;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub services: ServiceContainer,
    pub cache: QueryCache,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, services: ServiceContainer) -> Self {
        Self {
            cache: QueryCache::new(Duration::from_secs(config.cache_ttl_secs)),
            rate_limiter: RateLimiter::new(config.rate_limit),
            config,
            services,
        }
    }
}
