//! Transaction Tests
//!
//! Two-phase commit over the local backend:
//! - Staged changes stay invisible until commit
//! - Rollback discards staged changes
//! - A prepared transaction survives a restart, shows up in recover and
//!   can then be committed

mod common;

use std::sync::Arc;

use afsgate::connection::{ConnectionFactory, StorageConnectionFactory};
use afsgate::core::{Permissions, ProxyChain, WorkerContext};
use common::{chain, md5_of, FixedRights};
use tempfile::TempDir;
use uuid::Uuid;

fn alice_chain() -> ProxyChain {
    chain(
        Arc::new(FixedRights::new().grant("alice", Permissions::READ_WRITE)),
        1_000_000,
    )
}

fn context(factory: &StorageConnectionFactory) -> WorkerContext {
    WorkerContext::new(factory.connect().unwrap()).with_session_token("token")
}

async fn write(chain: &ProxyChain, ctx: &mut WorkerContext, path: &str, data: &[u8]) -> bool {
    chain
        .write(ctx, "alice", path, 0, data.to_vec(), md5_of(data))
        .await
        .unwrap()
}

// =============================================================================
// Clean Lifecycle
// =============================================================================

/// begin → write → prepare → commit publishes the write, leaves nothing
/// to recover.
#[tokio::test]
async fn test_commit_publishes_staged_write() {
    let dir = TempDir::new().unwrap();
    let factory = StorageConnectionFactory::local(dir.path()).unwrap();
    let chain = alice_chain();
    let mut ctx = context(&factory);
    let id = Uuid::new_v4();

    chain.begin(&mut ctx, id).await.unwrap();
    assert!(write(&chain, &mut ctx, "/report.txt", b"draft").await);

    // Reads inside the transaction see committed state only
    assert!(chain.read(&mut ctx, "alice", "/report.txt", 0, 100).await.is_err());

    assert!(chain.prepare(&mut ctx).await.unwrap());
    chain.commit(&mut ctx).await.unwrap();

    let data = chain.read(&mut ctx, "alice", "/report.txt", 0, 100).await.unwrap();
    assert_eq!(data, b"draft".to_vec());
    assert!(chain.recover(&mut ctx).await.unwrap().is_empty());
    assert!(dir.path().join("alice").join("report.txt").exists());
}

/// Rollback drops everything staged since begin.
#[tokio::test]
async fn test_rollback_discards_staged_write() {
    let dir = TempDir::new().unwrap();
    let factory = StorageConnectionFactory::local(dir.path()).unwrap();
    let chain = alice_chain();
    let mut ctx = context(&factory);

    chain.begin(&mut ctx, Uuid::new_v4()).await.unwrap();
    write(&chain, &mut ctx, "/tmp.txt", b"scratch").await;
    chain.rollback(&mut ctx).await.unwrap();

    assert!(chain.read(&mut ctx, "alice", "/tmp.txt", 0, 100).await.is_err());
    assert!(chain.recover(&mut ctx).await.unwrap().is_empty());
}

/// A transaction whose staged copy cannot apply votes no and stays open.
#[tokio::test]
async fn test_prepare_votes_no_when_source_missing() {
    let factory = StorageConnectionFactory::memory();
    let chain = alice_chain();
    let mut ctx = context(&factory);
    let id = Uuid::new_v4();

    chain.begin(&mut ctx, id).await.unwrap();
    chain
        .copy(&mut ctx, "alice", "/missing.txt", "alice", "/copy.txt")
        .await
        .unwrap();

    assert!(!chain.prepare(&mut ctx).await.unwrap());
    assert_eq!(ctx.connection_mut().transaction_id(), Some(id));

    chain.rollback(&mut ctx).await.unwrap();
    assert_eq!(ctx.connection_mut().transaction_id(), None);
}

// =============================================================================
// Recovery
// =============================================================================

/// A prepared transaction outlives its connection and the process; after a
/// restart recover reports it and a transaction manager can commit it.
#[tokio::test]
async fn test_prepared_transaction_recovered_after_restart() {
    let dir = TempDir::new().unwrap();
    let chain = alice_chain();
    let id = Uuid::new_v4();

    {
        let factory = StorageConnectionFactory::local(dir.path()).unwrap();
        let mut ctx = context(&factory);
        chain.begin(&mut ctx, id).await.unwrap();
        write(&chain, &mut ctx, "/ledger.csv", b"a,b\n").await;
        assert!(chain.prepare(&mut ctx).await.unwrap());
        // Crash: connection and factory go away without commit
    }

    let factory = StorageConnectionFactory::local(dir.path()).unwrap();
    let mut ctx = context(&factory);
    assert_eq!(chain.recover(&mut ctx).await.unwrap(), vec![id]);
    assert!(chain.read(&mut ctx, "alice", "/ledger.csv", 0, 100).await.is_err());

    chain.begin(&mut ctx, id).await.unwrap();
    chain.commit(&mut ctx).await.unwrap();

    let data = chain.read(&mut ctx, "alice", "/ledger.csv", 0, 100).await.unwrap();
    assert_eq!(data, b"a,b\n".to_vec());
    assert!(chain.recover(&mut ctx).await.unwrap().is_empty());
}

/// An orphaned transaction that never prepared is also reported, and can
/// be rolled back by id.
#[tokio::test]
async fn test_active_orphan_reported_and_rolled_back() {
    let factory = StorageConnectionFactory::memory();
    let chain = alice_chain();
    let id = Uuid::new_v4();

    {
        let mut ctx = context(&factory);
        chain.begin(&mut ctx, id).await.unwrap();
        write(&chain, &mut ctx, "/half.txt", b"x").await;
    }

    let mut ctx = context(&factory);
    assert_eq!(chain.recover(&mut ctx).await.unwrap(), vec![id]);

    chain.begin(&mut ctx, id).await.unwrap();
    chain.rollback(&mut ctx).await.unwrap();
    assert!(chain.recover(&mut ctx).await.unwrap().is_empty());
}

/// The same transaction cannot be attached to two live connections.
#[tokio::test]
async fn test_transaction_attached_once() {
    let factory = StorageConnectionFactory::memory();
    let chain = alice_chain();
    let id = Uuid::new_v4();

    let mut first = context(&factory);
    let mut second = context(&factory);
    chain.begin(&mut first, id).await.unwrap();

    assert!(chain.begin(&mut second, id).await.is_err());
    chain.rollback(&mut first).await.unwrap();
}
