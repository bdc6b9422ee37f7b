//! # Storage Connection
//!
//! `Connection` over a primitive `Storage` and a `TransactionJournal`.
//!
//! Outside a transaction every call hits storage directly. Between `begin`
//! and `commit`/`rollback` mutations are appended to the journal record and
//! only applied to storage at commit, so reads observe committed state.
//!
//! Commit first persists the record as `Prepared`, then applies the staged
//! operations and finally drops the record. A crash in between leaves a
//! `Prepared` record that `recover` reports and a later `begin` + `commit`
//! re-applies; re-application skips copies and moves that already landed.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::errors::{ConnectionError, ConnectionResult};
use super::storage::{normalize, Storage, TransactionJournal};
use super::transaction::{StagedOperation, TransactionRecord, TransactionState};
use super::{Connection, RawFile};

/// Connection handed out by `StorageConnectionFactory`
#[derive(Debug)]
pub struct StorageConnection {
    storage: Arc<dyn Storage>,
    journal: Arc<dyn TransactionJournal>,
    transaction: Option<TransactionRecord>,
}

impl StorageConnection {
    pub fn new(storage: Arc<dyn Storage>, journal: Arc<dyn TransactionJournal>) -> Self {
        Self {
            storage,
            journal,
            transaction: None,
        }
    }

    /// Current state of the bound transaction
    pub fn transaction_state(&self) -> Option<TransactionState> {
        self.transaction.as_ref().map(|record| record.state)
    }

    fn stage(&mut self, op: StagedOperation) -> ConnectionResult<()> {
        let Some(record) = self.transaction.as_mut() else {
            return Err(ConnectionError::NoActiveTransaction);
        };
        record.stage(op)?;
        self.journal.save(record)
    }

    fn release(&mut self) {
        if let Some(record) = self.transaction.take() {
            self.journal.detach(record.id);
        }
    }

    /// Dry-run the staged operations against current storage
    fn can_apply(&self, staged: &[StagedOperation]) -> ConnectionResult<bool> {
        let mut shadow = Shadow::new(self.storage.as_ref());

        for op in staged {
            match op {
                StagedOperation::Write { path, offset, data } => {
                    if shadow.under_file(path)? {
                        return Ok(false);
                    }
                    let size = match shadow.get(path)? {
                        Entry::Directory => return Ok(false),
                        Entry::Missing => 0,
                        Entry::File(size) => size,
                    };
                    if *offset > size {
                        return Ok(false);
                    }
                    shadow.set(path, Entry::File(size.max(offset + data.len() as u64)));
                }
                StagedOperation::Delete { path } => {
                    shadow.set(path, Entry::Missing);
                }
                StagedOperation::Copy { source, target }
                | StagedOperation::Move { source, target } => {
                    let entry = shadow.get(source)?;
                    if entry == Entry::Missing
                        || shadow.get(target)? != Entry::Missing
                        || shadow.under_file(target)?
                    {
                        return Ok(false);
                    }
                    if matches!(op, StagedOperation::Move { .. }) {
                        shadow.set(source, Entry::Missing);
                    }
                    shadow.set(target, entry);
                }
            }
        }
        Ok(true)
    }

    fn apply(&self, op: &StagedOperation) -> ConnectionResult<()> {
        match op {
            StagedOperation::Write { path, offset, data } => {
                self.storage.write(path, *offset, data)
            }
            StagedOperation::Delete { path } => self.storage.delete(path).map(|_| ()),
            StagedOperation::Copy { source, target } => {
                if self.storage.exists(target)? {
                    return Ok(());
                }
                self.storage.copy(source, target)
            }
            StagedOperation::Move { source, target } => {
                if !self.storage.exists(source)? && self.storage.exists(target)? {
                    return Ok(());
                }
                self.storage.r#move(source, target)
            }
        }
    }
}

impl Drop for StorageConnection {
    fn drop(&mut self) {
        // The journal record outlives the connection and shows up in recover()
        self.release();
    }
}

impl Connection for StorageConnection {
    fn list(&mut self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>> {
        self.storage.list(path, recursively)
    }

    fn read(&mut self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>> {
        self.storage.read(path, offset, limit)
    }

    fn write(
        &mut self,
        path: &str,
        offset: u64,
        data: &[u8],
        md5_hash: &[u8],
    ) -> ConnectionResult<bool> {
        let digest = md5::compute(data);
        if digest.0.as_slice() != md5_hash {
            return Err(ConnectionError::HashMismatch(path.to_string()));
        }

        if self.transaction.is_some() {
            self.stage(StagedOperation::Write {
                path: normalize(path),
                offset,
                data: data.to_vec(),
            })?;
        } else {
            self.storage.write(path, offset, data)?;
        }
        Ok(true)
    }

    fn delete(&mut self, path: &str) -> ConnectionResult<bool> {
        if self.transaction.is_some() {
            let existed = self.storage.exists(path)?;
            self.stage(StagedOperation::Delete {
                path: normalize(path),
            })?;
            Ok(existed)
        } else {
            self.storage.delete(path)
        }
    }

    fn copy(&mut self, source: &str, target: &str) -> ConnectionResult<bool> {
        if self.transaction.is_some() {
            self.stage(StagedOperation::Copy {
                source: normalize(source),
                target: normalize(target),
            })?;
        } else {
            self.storage.copy(source, target)?;
        }
        Ok(true)
    }

    fn r#move(&mut self, source: &str, target: &str) -> ConnectionResult<bool> {
        if self.transaction.is_some() {
            self.stage(StagedOperation::Move {
                source: normalize(source),
                target: normalize(target),
            })?;
        } else {
            self.storage.r#move(source, target)?;
        }
        Ok(true)
    }

    fn begin(&mut self, transaction_id: Uuid) -> ConnectionResult<()> {
        if let Some(current) = &self.transaction {
            return Err(ConnectionError::TransactionAlreadyActive(current.id));
        }
        if !self.journal.attach(transaction_id) {
            return Err(ConnectionError::TransactionInProgress(transaction_id));
        }

        let record = match self.journal.load(transaction_id) {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                let record = TransactionRecord::new(transaction_id);
                if let Err(e) = self.journal.save(&record) {
                    self.journal.detach(transaction_id);
                    return Err(e);
                }
                record
            }
            Err(e) => {
                self.journal.detach(transaction_id);
                return Err(e);
            }
        };

        self.transaction = Some(record);
        Ok(())
    }

    fn prepare(&mut self) -> ConnectionResult<bool> {
        let Some(record) = self.transaction.as_ref() else {
            return Err(ConnectionError::NoActiveTransaction);
        };
        if record.state == TransactionState::Prepared {
            return Ok(true);
        }
        if !self.can_apply(&record.staged)? {
            return Ok(false);
        }

        let mut prepared = record.clone();
        prepared.transition(TransactionState::Prepared)?;
        self.journal.save(&prepared)?;
        self.transaction = Some(prepared);
        Ok(true)
    }

    fn commit(&mut self) -> ConnectionResult<()> {
        let Some(record) = self.transaction.as_ref() else {
            return Ok(());
        };

        let mut record = record.clone();
        if record.state == TransactionState::Active {
            if !self.can_apply(&record.staged)? {
                return Err(ConnectionError::InvalidTransition {
                    id: record.id,
                    from: record.state,
                    to: TransactionState::Committed,
                });
            }
            record.transition(TransactionState::Prepared)?;
            self.journal.save(&record)?;
            self.transaction = Some(record.clone());
        }

        for op in &record.staged {
            if let Err(e) = self.apply(op) {
                tracing::warn!(
                    transaction_id = %record.id,
                    error = %e,
                    "commit interrupted; transaction left prepared"
                );
                self.release();
                return Err(e);
            }
        }

        record.transition(TransactionState::Committed)?;
        self.journal.remove(record.id)?;
        self.release();
        Ok(())
    }

    fn rollback(&mut self) -> ConnectionResult<()> {
        let Some(record) = self.transaction.as_ref() else {
            return Ok(());
        };

        let mut record = record.clone();
        record.transition(TransactionState::RolledBack)?;
        self.journal.remove(record.id)?;
        self.release();
        Ok(())
    }

    fn recover(&mut self) -> ConnectionResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .journal
            .records()?
            .into_iter()
            .filter(|record| !record.state.is_terminal())
            .map(|record| record.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn transaction_id(&self) -> Option<Uuid> {
        self.transaction.as_ref().map(|record| record.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Missing,
    Directory,
    File(u64),
}

/// Overlay of pending changes on top of storage, used by `can_apply`
struct Shadow<'a> {
    storage: &'a dyn Storage,
    overlay: HashMap<String, Entry>,
}

impl<'a> Shadow<'a> {
    fn new(storage: &'a dyn Storage) -> Self {
        Self {
            storage,
            overlay: HashMap::new(),
        }
    }

    fn get(&self, path: &str) -> ConnectionResult<Entry> {
        let path = normalize(path);
        if let Some(entry) = self.overlay.get(&path) {
            return Ok(*entry);
        }

        let mut ancestor = path.as_str();
        while let Some(index) = ancestor.rfind('/') {
            ancestor = &ancestor[..index];
            if let Some(Entry::Missing) = self.overlay.get(ancestor) {
                return Ok(Entry::Missing);
            }
        }

        Ok(match self.storage.size(&path)? {
            Some(size) => Entry::File(size),
            None if self.storage.exists(&path)? => Entry::Directory,
            None => Entry::Missing,
        })
    }

    /// Some ancestor of `path` is a file, so nothing can be created there
    fn under_file(&self, path: &str) -> ConnectionResult<bool> {
        let path = normalize(path);
        let mut ancestor = path.as_str();
        while let Some(index) = ancestor.rfind('/') {
            ancestor = &ancestor[..index];
            if !ancestor.is_empty() && matches!(self.get(ancestor)?, Entry::File(_)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn set(&mut self, path: &str, entry: Entry) {
        let path = normalize(path);
        if entry != Entry::Missing {
            let mut ancestor = path.as_str();
            while let Some(index) = ancestor.rfind('/') {
                ancestor = &ancestor[..index];
                if !ancestor.is_empty() {
                    self.overlay.insert(ancestor.to_string(), Entry::Directory);
                }
            }
        }
        self.overlay.insert(path, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::{MemoryJournal, MemoryStorage};

    fn hash(data: &[u8]) -> Vec<u8> {
        md5::compute(data).0.to_vec()
    }

    fn connection() -> (StorageConnection, Arc<MemoryStorage>, Arc<MemoryJournal>) {
        let storage = Arc::new(MemoryStorage::new());
        let journal = Arc::new(MemoryJournal::new());
        let conn = StorageConnection::new(storage.clone(), journal.clone());
        (conn, storage, journal)
    }

    #[test]
    fn test_ambient_write_applies_immediately() {
        let (mut conn, storage, _) = connection();
        assert!(conn.write("/alice/a.txt", 0, b"abc", &hash(b"abc")).unwrap());
        assert_eq!(storage.read("/alice/a.txt", 0, 10).unwrap(), b"abc");
    }

    #[test]
    fn test_hash_mismatch_rejected() {
        let (mut conn, storage, _) = connection();
        let err = conn
            .write("/alice/a.txt", 0, b"abc", &hash(b"xyz"))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::HashMismatch(_)));
        assert!(!storage.exists("/alice/a.txt").unwrap());
    }

    #[test]
    fn test_transactional_write_visible_after_commit() {
        let (mut conn, storage, _) = connection();
        conn.begin(Uuid::new_v4()).unwrap();
        conn.write("/alice/a.txt", 0, b"abc", &hash(b"abc")).unwrap();

        assert!(!storage.exists("/alice/a.txt").unwrap());
        assert!(conn.prepare().unwrap());
        conn.commit().unwrap();

        assert_eq!(storage.read("/alice/a.txt", 0, 10).unwrap(), b"abc");
        assert_eq!(conn.transaction_id(), None);
        assert!(conn.recover().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_staged() {
        let (mut conn, storage, _) = connection();
        conn.begin(Uuid::new_v4()).unwrap();
        conn.write("/alice/a.txt", 0, b"abc", &hash(b"abc")).unwrap();
        conn.rollback().unwrap();

        assert!(!storage.exists("/alice/a.txt").unwrap());
        assert!(conn.recover().unwrap().is_empty());
    }

    #[test]
    fn test_prepare_false_keeps_active() {
        let (mut conn, _, _) = connection();
        conn.begin(Uuid::new_v4()).unwrap();
        conn.copy("/missing", "/alice/b").unwrap();

        assert!(!conn.prepare().unwrap());
        assert_eq!(conn.transaction_state(), Some(TransactionState::Active));
    }

    #[test]
    fn test_prepare_refuses_move_under_file() {
        let (mut conn, storage, _) = connection();
        storage.write("/alice/keep.txt", 0, b"keep").unwrap();
        storage.write("/alice/f", 0, b"file").unwrap();

        conn.begin(Uuid::new_v4()).unwrap();
        conn.r#move("/alice/keep.txt", "/alice/f/y.txt").unwrap();

        assert!(!conn.prepare().unwrap());
        assert!(storage.exists("/alice/keep.txt").unwrap());
    }

    #[test]
    fn test_ambient_move_under_file_keeps_source() {
        let (mut conn, storage, _) = connection();
        storage.write("/alice/keep.txt", 0, b"keep").unwrap();
        storage.write("/alice/f", 0, b"file").unwrap();

        assert!(conn.r#move("/alice/keep.txt", "/alice/f/y.txt").is_err());
        assert_eq!(storage.read("/alice/keep.txt", 0, 4).unwrap(), b"keep");
    }

    #[test]
    fn test_prepare_tracks_staged_sizes() {
        let (mut conn, _, _) = connection();
        conn.begin(Uuid::new_v4()).unwrap();
        conn.write("/a/x", 0, b"abc", &hash(b"abc")).unwrap();
        conn.write("/a/x", 3, b"def", &hash(b"def")).unwrap();
        assert!(conn.prepare().unwrap());
    }

    #[test]
    fn test_commit_and_rollback_without_transaction_are_noops() {
        let (mut conn, _, _) = connection();
        conn.commit().unwrap();
        conn.rollback().unwrap();
    }

    #[test]
    fn test_second_begin_rejected() {
        let (mut conn, _, _) = connection();
        let id = Uuid::new_v4();
        conn.begin(id).unwrap();
        assert!(matches!(
            conn.begin(Uuid::new_v4()),
            Err(ConnectionError::TransactionAlreadyActive(current)) if current == id
        ));
    }

    #[test]
    fn test_recover_reports_orphans_and_allows_resolution() {
        let storage = Arc::new(MemoryStorage::new());
        let journal = Arc::new(MemoryJournal::new());
        let id = Uuid::new_v4();

        {
            let mut conn = StorageConnection::new(storage.clone(), journal.clone());
            conn.begin(id).unwrap();
            conn.write("/alice/a.txt", 0, b"abc", &hash(b"abc")).unwrap();
            assert!(conn.prepare().unwrap());
        }

        let mut coordinator = StorageConnection::new(storage.clone(), journal.clone());
        assert_eq!(coordinator.recover().unwrap(), vec![id]);

        coordinator.begin(id).unwrap();
        coordinator.commit().unwrap();
        assert_eq!(storage.read("/alice/a.txt", 0, 10).unwrap(), b"abc");
        assert!(coordinator.recover().unwrap().is_empty());
    }

    #[test]
    fn test_attached_transaction_cannot_be_stolen() {
        let storage = Arc::new(MemoryStorage::new());
        let journal = Arc::new(MemoryJournal::new());
        let id = Uuid::new_v4();

        let mut first = StorageConnection::new(storage.clone(), journal.clone());
        first.begin(id).unwrap();

        let mut second = StorageConnection::new(storage, journal);
        assert!(matches!(
            second.begin(id),
            Err(ConnectionError::TransactionInProgress(_))
        ));
    }

    #[test]
    fn test_commit_reapplication_skips_landed_move() {
        let (conn, storage, _) = connection();
        storage.write("/a/y", 0, b"1").unwrap();
        conn.apply(&StagedOperation::Move {
            source: "/a/x".into(),
            target: "/a/y".into(),
        })
        .unwrap();
        assert_eq!(storage.read("/a/y", 0, 1).unwrap(), b"1");
    }
}
