use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use trainer_hub::cache::{self, QueryCache};
use trainer_hub::config::RateLimitConfig;
use trainer_hub::db::LocalStore;
use trainer_hub::models::{NewSecurityLog, SecurityEventType};
use trainer_hub::services::{LocalSecurityService, RateLimiter, SecurityService};
use uuid::Uuid;

fn benchmark_local_store(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let store = Arc::new(LocalStore::in_memory());
    let security = LocalSecurityService::new(store.clone());
    let user_id = Uuid::new_v4();

    // Fill the log to its cap so every write pays for a full document.
    runtime.block_on(async {
        for _ in 0..1_000 {
            security
                .log_event(NewSecurityLog::new(SecurityEventType::SignIn, Some(user_id)))
                .await
                .expect("Failed to seed security log");
        }
    });

    let mut group = c.benchmark_group("local_store");

    group.bench_function("log_event_full_document", |b| {
        b.iter(|| {
            runtime.block_on(security.log_event(black_box(NewSecurityLog::new(
                SecurityEventType::SignIn,
                Some(user_id),
            ))))
        })
    });

    group.bench_function("list_events_for_user", |b| {
        b.iter(|| runtime.block_on(security.list_events(black_box(Some(user_id)), 100)))
    });

    group.finish();
}

fn benchmark_request_path(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: u32::MAX,
        window_secs: 60,
    });
    let query_cache = QueryCache::new(Duration::from_secs(300));
    let key = cache::key("trainers", "bench");
    runtime
        .block_on(query_cache.get_or_fetch(&key, || async { Ok(vec![1u32; 64]) }))
        .expect("Failed to warm cache");

    let mut group = c.benchmark_group("request_path");

    group.bench_function("rate_limit_check", |b| {
        b.iter(|| limiter.check(black_box("203.0.113.7"), black_box("GET /api/me")))
    });

    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            runtime.block_on(query_cache.get_or_fetch::<Vec<u32>, _, _>(black_box(&key), || async {
                Ok(Vec::new())
            }))
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_local_store, benchmark_request_path);
criterion_main!(benches);
