// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query cache in front of the service reads.
//!
//! Keys are `service:scope` (for example `workouts:<trainer id>`). Read
//! handlers go through [`QueryCache::get_or_fetch`]; mutation handlers call
//! [`QueryCache::invalidate_prefix`] once the write has succeeded. Values are
//! stored as JSON so one map holds every result type.

use crate::error::AppError;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct QueryCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

/// Build a `service:scope` key.
pub fn key(service: &str, scope: impl Display) -> String {
    format!("{}:{}", service, scope)
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached value for `key`, or the result of `fetch` (cached on success).
    ///
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(value) = self.get(key) {
            match serde_json::from_value(value) {
                Ok(hit) => {
                    tracing::debug!(key, "Query cache hit");
                    return Ok(hit);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding unreadable cache entry");
                    self.entries.remove(key);
                }
            }
        }

        let fresh = fetch().await?;
        match serde_json::to_value(&fresh) {
            Ok(value) => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value,
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
            Err(e) => tracing::warn!(key, error = %e, "Result not cacheable"),
        }
        Ok(fresh)
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(prefix, removed, "Invalidated cached queries");
        }
        removed
    }

    /// Drop every entry of one service.
    pub fn invalidate_service(&self, service: &str) -> usize {
        self.invalidate_prefix(&format!("{}:", service))
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn counted(calls: &AtomicUsize, value: u32) -> Result<u32, AppError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("trainers:1", || counted(&calls, 7))
            .await
            .unwrap();
        let second = cache
            .get_or_fetch("trainers:1", || counted(&calls, 8))
            .await
            .unwrap();

        assert_eq!((first, second), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let err = cache
            .get_or_fetch::<u32, _, _>("ai:1", || async {
                Err(AppError::Backend("down".to_string()))
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);
        for k in ["workouts:a", "workouts:b", "ai:a"] {
            cache.get_or_fetch(k, || counted(&calls, 1)).await.unwrap();
        }

        assert_eq!(cache.invalidate_service("workouts"), 2);
        assert_eq!(cache.len(), 1);

        cache
            .get_or_fetch("workouts:a", || counted(&calls, 2))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let cache = QueryCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        cache.get_or_fetch("k:1", || counted(&calls, 1)).await.unwrap();
        cache.get_or_fetch("k:1", || counted(&calls, 2)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key("payments", 42), "payments:42");
    }
}
