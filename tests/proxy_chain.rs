//! Proxy Chain Tests
//!
//! Authorization → Validation → Logging → Executor, observed from the
//! backend side:
//! - Refused operations never reach the connection
//! - Physical paths are built only by the executor
//! - Copy and Move check source before target
//! - Refusals are counted even though they never reach the logging link

mod common;

use std::sync::Arc;

use afsgate::core::{CoreError, OperationKind, Permissions, ProxyChain};
use afsgate::observability::MetricsRegistry;
use common::{chain, md5_of, recording_context, Call, FixedRights};

// =============================================================================
// Authorization
// =============================================================================

/// A session without Read on the owner gets AclDenied and the backend is
/// never called.
#[tokio::test]
async fn test_list_without_read_is_denied_before_backend() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::READ_WRITE));
    let chain = chain(Arc::clone(&provider), 1_000_000);
    let (mut ctx, calls) = recording_context();

    let err = chain.list(&mut ctx, "bob", "/", false).await.unwrap_err();

    match err {
        CoreError::AclDenied {
            owner,
            operation,
            permissions,
            ..
        } => {
            assert_eq!(owner, "bob");
            assert_eq!(operation, OperationKind::List);
            assert_eq!(permissions, Permissions::READ);
        }
        other => panic!("expected AclDenied, got {:?}", other),
    }
    assert!(calls.lock().unwrap().is_empty());
}

/// Copy asks Read on the source owner, then Write on the target owner.
#[tokio::test]
async fn test_copy_checks_source_then_target() {
    let provider = Arc::new(
        FixedRights::new()
            .grant("alice", Permissions::READ)
            .grant("bob", Permissions::WRITE),
    );
    let chain = chain(Arc::clone(&provider), 1_000_000);
    let (mut ctx, calls) = recording_context();

    assert!(chain
        .copy(&mut ctx, "alice", "/a.txt", "bob", "/b.txt")
        .await
        .unwrap());

    assert_eq!(
        *provider.asked.lock().unwrap(),
        vec![
            ("alice".to_string(), Permissions::READ),
            ("bob".to_string(), Permissions::WRITE)
        ]
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec![Call::Copy("/alice/a.txt".into(), "/bob/b.txt".into())]
    );
}

/// Move needs Read and Write on the source; Read alone is not enough and
/// the target is then never asked about.
#[tokio::test]
async fn test_move_requires_read_write_on_source() {
    let provider = Arc::new(
        FixedRights::new()
            .grant("alice", Permissions::READ)
            .grant("bob", Permissions::WRITE),
    );
    let chain = chain(Arc::clone(&provider), 1_000_000);
    let (mut ctx, calls) = recording_context();

    let err = chain
        .r#move(&mut ctx, "alice", "/a.txt", "bob", "/b.txt")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AclDenied { ref owner, .. } if owner == "alice"));
    assert_eq!(provider.asked.lock().unwrap().len(), 1);
    assert!(calls.lock().unwrap().is_empty());
}

/// Transaction control needs no file permissions.
#[tokio::test]
async fn test_transaction_control_skips_authorization() {
    let provider = Arc::new(FixedRights::new());
    let chain = chain(Arc::clone(&provider), 1_000_000);
    let (mut ctx, calls) = recording_context();
    let id = uuid::Uuid::new_v4();

    chain.begin(&mut ctx, id).await.unwrap();
    assert!(chain.prepare(&mut ctx).await.unwrap());
    chain.commit(&mut ctx).await.unwrap();

    assert!(provider.asked.lock().unwrap().is_empty());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![Call::Begin(id), Call::Prepare, Call::Commit]
    );
}

// =============================================================================
// Validation
// =============================================================================

/// A read limit above the configured maximum is refused with both numbers.
#[tokio::test]
async fn test_read_above_limit_is_refused() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::READ));
    let chain = chain(provider, 1_000_000);
    let (mut ctx, calls) = recording_context();

    let err = chain
        .read(&mut ctx, "alice", "/big.bin", 0, 10_000_000)
        .await
        .unwrap_err();

    match err {
        CoreError::ReadSizeExceeded { limit, max, .. } => {
            assert_eq!(limit, 10_000_000);
            assert_eq!(max, 1_000_000);
        }
        other => panic!("expected ReadSizeExceeded, got {:?}", other),
    }
    assert!(calls.lock().unwrap().is_empty());
}

/// A read exactly at the limit passes.
#[tokio::test]
async fn test_read_at_limit_passes() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::READ));
    let chain = chain(provider, 1_000_000);
    let (mut ctx, calls) = recording_context();

    let data = chain
        .read(&mut ctx, "alice", "/big.bin", 5, 1_000_000)
        .await
        .unwrap();

    assert_eq!(data, b"data".to_vec());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![Call::Read("/alice/big.bin".into(), 5, 1_000_000)]
    );
}

/// Paths climbing out of the owner namespace never reach the backend.
#[tokio::test]
async fn test_parent_segments_rejected() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::READ_WRITE));
    let chain = chain(provider, 1_000_000);
    let (mut ctx, calls) = recording_context();

    let err = chain
        .delete(&mut ctx, "alice", "/../bob/secret")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidPath { .. }));
    assert!(calls.lock().unwrap().is_empty());
}

/// Negative offsets are a range error, not a backend error.
#[tokio::test]
async fn test_negative_offset_rejected() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::READ));
    let chain = chain(provider, 1_000_000);
    let (mut ctx, _calls) = recording_context();

    let err = chain.read(&mut ctx, "alice", "/a", -1, 10).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidRange {
            parameter: "offset",
            value: -1
        }
    ));
}

// =============================================================================
// Executor
// =============================================================================

/// Write resolves "/alice/x.bin" and returns the backend's answer unchanged.
#[tokio::test]
async fn test_write_resolves_owner_path() {
    let provider = Arc::new(FixedRights::new().grant("alice", Permissions::WRITE));
    let chain = chain(provider, 1_000_000);
    let (mut ctx, calls) = recording_context();
    let data = b"payload".to_vec();

    let written = chain
        .write(&mut ctx, "alice", "/x.bin", 0, data.clone(), md5_of(&data))
        .await
        .unwrap();

    assert!(written);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![Call::Write("/alice/x.bin".into(), 0, data.len())]
    );
}

// =============================================================================
// Metrics
// =============================================================================

/// ACL and size refusals count as rejected; a backend call counts as
/// executed.
#[tokio::test]
async fn test_rejections_counted() {
    let metrics = Arc::new(MetricsRegistry::new());
    let chain = ProxyChain::standard(
        Arc::new(FixedRights::new().grant("alice", Permissions::READ)),
        1_000,
        1_000,
        Arc::clone(&metrics),
    );
    let (mut ctx, _calls) = recording_context();

    assert!(chain.list(&mut ctx, "bob", "/", false).await.is_err());
    assert!(chain.read(&mut ctx, "alice", "/a", 0, 5_000).await.is_err());
    chain.read(&mut ctx, "alice", "/a", 0, 10).await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.operations_rejected, 2);
    assert_eq!(snapshot.operations_executed, 1);
    assert_eq!(snapshot.operations_failed, 0);
}
