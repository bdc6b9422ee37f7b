//! # Backend Connections
//!
//! The transactional backend behind the executor. A `Connection` is owned
//! by exactly one worker at a time and is not safe for concurrent use.
//!
//! `StorageConnection` is the bundled implementation: it layers the
//! transaction journal on top of a primitive `Storage` (in-memory or local
//! filesystem).

pub mod errors;
pub mod local;
pub mod memory;
pub mod storage;
pub mod store_connection;
pub mod transaction;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use errors::{ConnectionError, ConnectionResult};
pub use local::{FileJournal, LocalStorage};
pub use memory::{MemoryJournal, MemoryStorage};
pub use storage::{Storage, TransactionJournal};
pub use store_connection::StorageConnection;
pub use transaction::{StagedOperation, TransactionRecord, TransactionState};

/// File descriptor as reported by the backend, keyed by physical path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: String,
    pub name: String,
    pub directory: bool,
    pub size: Option<u64>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_access_time: Option<DateTime<Utc>>,
}

/// Transactional backend connection
///
/// Operations outside `begin`..`commit`/`rollback` run against the
/// ambient, non-transactional context.
pub trait Connection: Send {
    fn list(&mut self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>>;

    fn read(&mut self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>>;

    fn write(
        &mut self,
        path: &str,
        offset: u64,
        data: &[u8],
        md5_hash: &[u8],
    ) -> ConnectionResult<bool>;

    fn delete(&mut self, path: &str) -> ConnectionResult<bool>;

    fn copy(&mut self, source: &str, target: &str) -> ConnectionResult<bool>;

    fn r#move(&mut self, source: &str, target: &str) -> ConnectionResult<bool>;

    fn begin(&mut self, transaction_id: Uuid) -> ConnectionResult<()>;

    /// Returns whether the bound transaction can commit
    fn prepare(&mut self) -> ConnectionResult<bool>;

    fn commit(&mut self) -> ConnectionResult<()>;

    fn rollback(&mut self) -> ConnectionResult<()>;

    /// Ids of transactions left in a non-terminal state
    fn recover(&mut self) -> ConnectionResult<Vec<Uuid>>;

    /// Id of the transaction bound to this connection, if any
    fn transaction_id(&self) -> Option<Uuid>;
}

/// Creates fresh connections for the worker pool
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> ConnectionResult<Box<dyn Connection>>;
}

/// Factory handing out `StorageConnection`s over one shared storage
pub struct StorageConnectionFactory {
    storage: Arc<dyn Storage>,
    journal: Arc<dyn TransactionJournal>,
}

impl StorageConnectionFactory {
    pub fn new(storage: Arc<dyn Storage>, journal: Arc<dyn TransactionJournal>) -> Self {
        Self { storage, journal }
    }

    /// In-memory storage and journal
    pub fn memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryJournal::new()),
        )
    }

    /// Local filesystem storage with an on-disk journal under `root`
    pub fn local(root: impl Into<std::path::PathBuf>) -> ConnectionResult<Self> {
        let storage = LocalStorage::open(root)?;
        let journal = FileJournal::open(storage.journal_dir())?;
        Ok(Self::new(Arc::new(storage), Arc::new(journal)))
    }
}

impl ConnectionFactory for StorageConnectionFactory {
    fn connect(&self) -> ConnectionResult<Box<dyn Connection>> {
        Ok(Box::new(StorageConnection::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.journal),
        )))
    }
}
