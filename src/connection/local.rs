//! # Local Filesystem Storage
//!
//! Files live under a root directory; physical path `/alice/a.txt` maps to
//! `<root>/alice/a.txt`. The transaction journal is kept in
//! `<root>/.afs-transactions/`, one checksummed JSON file per transaction,
//! and is hidden from listings.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ConnectionError, ConnectionResult};
use super::storage::{file_name, normalize, Storage, TransactionJournal};
use super::transaction::TransactionRecord;
use super::RawFile;

/// Name of the journal directory under the storage root
pub const JOURNAL_DIR: &str = ".afs-transactions";

/// Filesystem-backed storage
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open storage rooted at `root`, creating the directory if missing
    pub fn open(root: impl Into<PathBuf>) -> ConnectionResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        self.root.join(normalized.trim_start_matches('/'))
    }

    fn is_journal(&self, full: &Path) -> bool {
        full.starts_with(self.journal_dir())
    }

    fn describe(path: &str, full: &Path) -> ConnectionResult<RawFile> {
        let metadata = fs::metadata(full).map_err(|e| ConnectionError::io_at(path, e))?;
        let timestamp = |t: std::io::Result<std::time::SystemTime>| t.ok().map(DateTime::<Utc>::from);
        Ok(RawFile {
            path: path.to_string(),
            name: file_name(path),
            directory: metadata.is_dir(),
            size: if metadata.is_dir() {
                None
            } else {
                Some(metadata.len())
            },
            last_modified_time: timestamp(metadata.modified()),
            creation_time: timestamp(metadata.created()),
            last_access_time: timestamp(metadata.accessed()),
        })
    }

    fn walk(
        &self,
        path: &str,
        full: &Path,
        recursively: bool,
        out: &mut Vec<RawFile>,
    ) -> ConnectionResult<()> {
        let mut entries: Vec<_> = fs::read_dir(full)
            .map_err(|e| ConnectionError::io_at(path, e))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let child_full = entry.path();
            if self.is_journal(&child_full) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = if path == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", path, name)
            };
            let file = Self::describe(&child, &child_full)?;
            let descend = recursively && file.directory;
            out.push(file);
            if descend {
                self.walk(&child, &child_full, true, out)?;
            }
        }
        Ok(())
    }

    fn create_parents(full: &Path) -> ConnectionResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn copy_tree(source: &Path, target: &Path) -> ConnectionResult<()> {
        if source.is_dir() {
            fs::create_dir_all(target)?;
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                Self::copy_tree(&entry.path(), &target.join(entry.file_name()))?;
            }
        } else {
            fs::copy(source, target)?;
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn list(&self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>> {
        let path = normalize(path);
        let full = self.full_path(&path);
        if !full.exists() || self.is_journal(&full) {
            return Err(ConnectionError::NotFound(path));
        }
        if !full.is_dir() {
            return Ok(vec![Self::describe(&path, &full)?]);
        }

        let mut files = Vec::new();
        self.walk(&path, &full, recursively, &mut files)?;
        Ok(files)
    }

    fn read(&self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>> {
        let path = normalize(path);
        let full = self.full_path(&path);
        if full.is_dir() {
            return Err(ConnectionError::IsDirectory(path));
        }

        let mut file = fs::File::open(&full).map_err(|e| ConnectionError::io_at(&path, e))?;
        let size = file.metadata()?.len();
        if offset > size {
            return Err(ConnectionError::InvalidOffset { path, offset, size });
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(limit.min(64 * 1024) as usize);
        file.take(u64::from(limit)).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn write(&self, path: &str, offset: u64, data: &[u8]) -> ConnectionResult<()> {
        let path = normalize(path);
        let full = self.full_path(&path);
        if full.is_dir() {
            return Err(ConnectionError::IsDirectory(path));
        }

        let size = fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
        if offset > size {
            return Err(ConnectionError::InvalidOffset { path, offset, size });
        }

        Self::create_parents(&full)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&full)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    fn delete(&self, path: &str) -> ConnectionResult<bool> {
        let path = normalize(path);
        let full = self.full_path(&path);
        if path == "/" || !full.exists() {
            return Ok(false);
        }

        if full.is_dir() {
            fs::remove_dir_all(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(true)
    }

    fn copy(&self, source: &str, target: &str) -> ConnectionResult<()> {
        let (source, target) = (normalize(source), normalize(target));
        let (source_full, target_full) = (self.full_path(&source), self.full_path(&target));
        if !source_full.exists() {
            return Err(ConnectionError::NotFound(source));
        }
        if target_full.exists() {
            return Err(ConnectionError::AlreadyExists(target));
        }

        Self::create_parents(&target_full)?;
        Self::copy_tree(&source_full, &target_full)
    }

    fn r#move(&self, source: &str, target: &str) -> ConnectionResult<()> {
        let (source, target) = (normalize(source), normalize(target));
        let (source_full, target_full) = (self.full_path(&source), self.full_path(&target));
        if !source_full.exists() {
            return Err(ConnectionError::NotFound(source));
        }
        if target_full.exists() {
            return Err(ConnectionError::AlreadyExists(target));
        }

        Self::create_parents(&target_full)?;
        fs::rename(&source_full, &target_full)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> ConnectionResult<bool> {
        Ok(self.full_path(path).exists())
    }

    fn size(&self, path: &str) -> ConnectionResult<Option<u64>> {
        match fs::metadata(self.full_path(path)) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// On-disk envelope: the serialised record and its CRC32
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    checksum: u32,
    record: String,
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Durable transaction journal, one file per transaction
#[derive(Debug)]
pub struct FileJournal {
    dir: PathBuf,
    attached: Mutex<HashSet<Uuid>>,
}

impl FileJournal {
    pub fn open(dir: impl Into<PathBuf>) -> ConnectionResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            attached: Mutex::new(HashSet::new()),
        })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn decode(path: &Path) -> ConnectionResult<TransactionRecord> {
        let raw = fs::read(path)?;
        let entry: JournalEntry = serde_json::from_slice(&raw)
            .map_err(|e| ConnectionError::journal(format!("{}: {}", path.display(), e)))?;
        if checksum(entry.record.as_bytes()) != entry.checksum {
            return Err(ConnectionError::journal(format!(
                "checksum mismatch in {}",
                path.display()
            )));
        }
        serde_json::from_str(&entry.record)
            .map_err(|e| ConnectionError::journal(format!("{}: {}", path.display(), e)))
    }
}

impl TransactionJournal for FileJournal {
    fn save(&self, record: &TransactionRecord) -> ConnectionResult<()> {
        let body = serde_json::to_string(record)
            .map_err(|e| ConnectionError::journal(e.to_string()))?;
        let entry = JournalEntry {
            checksum: checksum(body.as_bytes()),
            record: body,
        };
        let bytes =
            serde_json::to_vec(&entry).map_err(|e| ConnectionError::journal(e.to_string()))?;

        let path = self.record_path(record.id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, id: Uuid) -> ConnectionResult<Option<TransactionRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::decode(&path).map(Some)
    }

    fn remove(&self, id: Uuid) -> ConnectionResult<()> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn records(&self) -> ConnectionResult<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                records.push(Self::decode(&path)?);
            }
        }
        Ok(records)
    }

    fn attach(&self, id: Uuid) -> bool {
        match self.attached.lock() {
            Ok(mut attached) => attached.insert(id),
            Err(_) => false,
        }
    }

    fn detach(&self, id: Uuid) {
        if let Ok(mut attached) = self.attached.lock() {
            attached.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transaction::{StagedOperation, TransactionState};
    use tempfile::TempDir;

    #[test]
    fn test_write_read_nested() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::open(temp.path()).unwrap();

        storage.write("/alice/a/b/file.txt", 0, b"nested").unwrap();
        assert_eq!(storage.read("/alice/a/b/file.txt", 0, 100).unwrap(), b"nested");
        assert_eq!(storage.read("/alice/a/b/file.txt", 2, 3).unwrap(), b"ste");
    }

    #[test]
    fn test_listing_hides_journal() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::open(temp.path()).unwrap();
        let _journal = FileJournal::open(storage.journal_dir()).unwrap();
        storage.write("/alice/a.txt", 0, b"x").unwrap();

        let files = storage.list("/", true).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/alice", "/alice/a.txt"]);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::open(temp.path()).unwrap();
        assert!(matches!(
            storage.read("/nope.txt", 0, 1),
            Err(ConnectionError::NotFound(_))
        ));
    }

    #[test]
    fn test_move_and_copy() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::open(temp.path()).unwrap();
        storage.write("/a/dir/one.txt", 0, b"1").unwrap();

        storage.copy("/a/dir", "/b/dir").unwrap();
        storage.r#move("/a/dir/one.txt", "/a/renamed.txt").unwrap();

        assert_eq!(storage.read("/b/dir/one.txt", 0, 10).unwrap(), b"1");
        assert_eq!(storage.read("/a/renamed.txt", 0, 10).unwrap(), b"1");
        assert!(!storage.exists("/a/dir/one.txt").unwrap());
    }

    #[test]
    fn test_journal_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        {
            let journal = FileJournal::open(temp.path()).unwrap();
            let mut record = TransactionRecord::new(id);
            record
                .stage(StagedOperation::Delete { path: "/a".into() })
                .unwrap();
            record.transition(TransactionState::Prepared).unwrap();
            journal.save(&record).unwrap();
        }

        let journal = FileJournal::open(temp.path()).unwrap();
        let loaded = journal.load(id).unwrap().unwrap();
        assert_eq!(loaded.state, TransactionState::Prepared);
        assert_eq!(loaded.staged.len(), 1);
        assert_eq!(journal.records().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_journal_entry_detected() {
        let temp = TempDir::new().unwrap();
        let journal = FileJournal::open(temp.path()).unwrap();
        let id = Uuid::new_v4();
        journal.save(&TransactionRecord::new(id)).unwrap();

        let path = temp.path().join(format!("{}.json", id));
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("Active", "Prepared");
        fs::write(&path, tampered).unwrap();

        assert!(matches!(journal.load(id), Err(ConnectionError::Journal(_))));
    }
}
