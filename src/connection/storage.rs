//! # Storage and Journal Traits
//!
//! Primitive, non-transactional file operations and the durable record of
//! in-flight transactions. `StorageConnection` composes the two.

use uuid::Uuid;

use super::errors::ConnectionResult;
use super::transaction::TransactionRecord;
use super::RawFile;

/// Physical file store addressed by absolute `/`-separated paths
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn list(&self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>>;

    fn read(&self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>>;

    /// Write `data` at `offset`, creating the file and parents as needed.
    /// `offset` may not exceed the current file size.
    fn write(&self, path: &str, offset: u64, data: &[u8]) -> ConnectionResult<()>;

    /// Returns false if nothing existed at `path`
    fn delete(&self, path: &str) -> ConnectionResult<bool>;

    fn copy(&self, source: &str, target: &str) -> ConnectionResult<()>;

    fn r#move(&self, source: &str, target: &str) -> ConnectionResult<()>;

    fn exists(&self, path: &str) -> ConnectionResult<bool>;

    /// Size of a regular file, `None` for directories or missing paths
    fn size(&self, path: &str) -> ConnectionResult<Option<u64>>;
}

/// Durable store of non-terminal transaction records
pub trait TransactionJournal: Send + Sync + std::fmt::Debug {
    fn save(&self, record: &TransactionRecord) -> ConnectionResult<()>;

    fn load(&self, id: Uuid) -> ConnectionResult<Option<TransactionRecord>>;

    fn remove(&self, id: Uuid) -> ConnectionResult<()>;

    fn records(&self) -> ConnectionResult<Vec<TransactionRecord>>;

    /// Mark a transaction as owned by a live connection. Returns false if
    /// another connection already holds it.
    fn attach(&self, id: Uuid) -> bool;

    fn detach(&self, id: Uuid);
}

/// Normalise a physical path: collapse duplicate separators, drop a
/// trailing separator, always start with `/`
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// Last component of a normalised path
pub fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}
