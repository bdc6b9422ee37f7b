//! Worker Pool Tests
//!
//! Every check-out is matched by exactly one check-in, whatever the
//! request outcome, and the pool never hands out more workers than
//! configured.

mod common;

use std::sync::Arc;
use std::time::Duration;

use afsgate::api::{group_parameters, ApiServerAdapter};
use afsgate::connection::StorageConnectionFactory;
use afsgate::http_server::GatewayState;
use afsgate::pool::{CheckoutPolicy, PoolError, WorkerGuard, WorkerPool};
use axum::http::Method;
use common::gateway_config;
use serde_json::json;

fn adapter() -> ApiServerAdapter {
    let config = gateway_config("pw");
    GatewayState::with_factory(&config, Arc::new(StorageConnectionFactory::memory())).adapter
}

async fn list(adapter: &ApiServerAdapter, token: Option<&str>, source: &str) -> u16 {
    let mut pairs = vec![
        ("method", "list"),
        ("owner", "alice"),
        ("source", source),
        ("recursively", "true"),
    ];
    if let Some(token) = token {
        pairs.push(("sessionToken", token));
    }
    adapter
        .process(&Method::GET, &group_parameters(pairs), b"")
        .await
        .status
}

async fn login(adapter: &ApiServerAdapter) -> String {
    let params = group_parameters([("method", "login")]);
    let body = json!({"userId": "alice", "password": "pw"}).to_string();
    let wire = adapter.process(&Method::POST, &params, body.as_bytes()).await;
    wire.json_body().unwrap()["result"]
        .as_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Balance
// =============================================================================

/// Successful and failing requests all return their worker.
#[tokio::test]
async fn test_checkouts_balanced_after_mixed_outcomes() {
    let adapter = adapter();

    let token = login(&adapter).await;

    // Nothing stored yet: backend error
    assert_eq!(list(&adapter, Some(&token), "/").await, 500);
    // No session: the ACL provider refuses everything
    assert_eq!(list(&adapter, None, "/").await, 403);
    // Escaping path: validation error
    assert_eq!(list(&adapter, Some(&token), "/../bob").await, 400);
    // Parameter error: refused before any worker is taken
    let params = group_parameters([("method", "list"), ("owner", "alice")]);
    assert_eq!(adapter.process(&Method::GET, &params, b"").await.status, 400);

    let stats = adapter.server().pool().stats();
    assert_eq!(stats.checkouts, 3);
    assert_eq!(stats.checkins, 3);
    assert_eq!(stats.in_use, 0);
}

/// Concurrent requests never exceed the pool size and all check in.
#[tokio::test]
async fn test_concurrent_requests_bounded_by_pool() {
    let factory = Arc::new(StorageConnectionFactory::memory());
    let pool = Arc::new(WorkerPool::new(factory, 3, CheckoutPolicy::Block));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            let worker = pool.check_out().await.unwrap();
            assert!(pool.available() < 3);
            tokio::time::sleep(Duration::from_millis(2)).await;
            pool.check_in(false, worker);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.checkouts, 20);
    assert_eq!(stats.checkins, 20);
    assert!(stats.created <= 3);
    assert_eq!(pool.available(), 3);
}

/// A guard dropped mid-flight still returns its worker.
#[tokio::test]
async fn test_dropped_guard_returns_worker() {
    let factory = Arc::new(StorageConnectionFactory::memory());
    let pool = Arc::new(WorkerPool::new(factory, 1, CheckoutPolicy::FailFast));

    let worker = pool.check_out().await.unwrap();
    let guard = WorkerGuard::new(Arc::clone(&pool), worker);
    assert!(matches!(
        pool.check_out().await,
        Err(PoolError::Exhausted { .. })
    ));

    drop(guard);

    let stats = pool.stats();
    assert_eq!(stats.checkins, 1);
    assert_eq!(stats.in_use, 0);
    assert!(pool.check_out().await.is_ok());
}

/// Shutdown refuses new requests.
#[tokio::test]
async fn test_shutdown_refuses_requests() {
    let adapter = adapter();
    adapter.server().shutdown();

    assert_eq!(list(&adapter, None, "/").await, 500);
    assert_eq!(adapter.server().pool().stats().checkouts, 0);
}
