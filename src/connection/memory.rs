//! # In-Memory Storage
//!
//! Volatile storage and journal. Used by tests and by the `memory` storage
//! kind in the configuration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::{ConnectionError, ConnectionResult};
use super::storage::{file_name, normalize, Storage, TransactionJournal};
use super::transaction::TransactionRecord;
use super::RawFile;

#[derive(Debug, Clone)]
enum Node {
    Directory {
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    File {
        data: Vec<u8>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        accessed: DateTime<Utc>,
    },
}

impl Node {
    fn directory() -> Self {
        let now = Utc::now();
        Self::Directory {
            created: now,
            modified: now,
        }
    }

    fn describe(&self, path: &str) -> RawFile {
        match self {
            Node::Directory { created, modified } => RawFile {
                path: path.to_string(),
                name: file_name(path),
                directory: true,
                size: None,
                last_modified_time: Some(*modified),
                creation_time: Some(*created),
                last_access_time: None,
            },
            Node::File {
                data,
                created,
                modified,
                accessed,
            } => RawFile {
                path: path.to_string(),
                name: file_name(path),
                directory: false,
                size: Some(data.len() as u64),
                last_modified_time: Some(*modified),
                creation_time: Some(*created),
                last_access_time: Some(*accessed),
            },
        }
    }
}

/// In-memory file tree keyed by normalised path
#[derive(Debug)]
pub struct MemoryStorage {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::directory());
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    fn poisoned() -> ConnectionError {
        ConnectionError::internal("memory storage lock poisoned")
    }

    fn is_descendant(candidate: &str, parent: &str) -> bool {
        if parent == "/" {
            candidate != "/"
        } else {
            candidate
                .strip_prefix(parent)
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
        }
    }

    /// Fails if any ancestor of `path` is a file; touches nothing
    fn check_parents(nodes: &BTreeMap<String, Node>, path: &str) -> ConnectionResult<()> {
        let mut current = String::new();
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for part in parts.iter().take(parts.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(part);
            if let Some(Node::File { .. }) = nodes.get(&current) {
                return Err(ConnectionError::AlreadyExists(current));
            }
        }
        Ok(())
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) -> ConnectionResult<()> {
        Self::check_parents(nodes, path)?;
        let mut current = String::new();
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for part in parts.iter().take(parts.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(part);
            match nodes.get(&current) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => return Err(ConnectionError::AlreadyExists(current)),
                None => {
                    nodes.insert(current.clone(), Node::directory());
                }
            }
        }
        Ok(())
    }

    /// Snapshot of `source` and its descendants re-keyed under `target`
    fn subtree(
        nodes: &BTreeMap<String, Node>,
        source: &str,
        target: &str,
    ) -> ConnectionResult<Vec<(String, Node)>> {
        let root = nodes
            .get(source)
            .ok_or_else(|| ConnectionError::NotFound(source.to_string()))?;
        let mut entries = vec![(target.to_string(), root.clone())];
        for (path, node) in nodes.iter() {
            if Self::is_descendant(path, source) {
                let suffix = &path[source.len()..];
                entries.push((format!("{}{}", target.trim_end_matches('/'), suffix), node.clone()));
            }
        }
        Ok(entries)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn list(&self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>> {
        let path = normalize(path);
        let nodes = self.nodes.read().map_err(|_| Self::poisoned())?;

        let node = nodes
            .get(&path)
            .ok_or_else(|| ConnectionError::NotFound(path.clone()))?;
        if let Node::File { .. } = node {
            return Ok(vec![node.describe(&path)]);
        }

        let depth = path.matches('/').count() + usize::from(path != "/");
        Ok(nodes
            .iter()
            .filter(|(candidate, _)| Self::is_descendant(candidate, &path))
            .filter(|(candidate, _)| recursively || candidate.matches('/').count() == depth)
            .map(|(candidate, node)| node.describe(candidate))
            .collect())
    }

    fn read(&self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>> {
        let path = normalize(path);
        let mut nodes = self.nodes.write().map_err(|_| Self::poisoned())?;

        match nodes.get_mut(&path) {
            Some(Node::File { data, accessed, .. }) => {
                let size = data.len() as u64;
                if offset > size {
                    return Err(ConnectionError::InvalidOffset { path, offset, size });
                }
                let end = size.min(offset + u64::from(limit));
                *accessed = Utc::now();
                Ok(data[offset as usize..end as usize].to_vec())
            }
            Some(Node::Directory { .. }) => Err(ConnectionError::IsDirectory(path)),
            None => Err(ConnectionError::NotFound(path)),
        }
    }

    fn write(&self, path: &str, offset: u64, bytes: &[u8]) -> ConnectionResult<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write().map_err(|_| Self::poisoned())?;

        match nodes.get_mut(&path) {
            Some(Node::Directory { .. }) => Err(ConnectionError::IsDirectory(path)),
            Some(Node::File { data, modified, .. }) => {
                let size = data.len() as u64;
                if offset > size {
                    return Err(ConnectionError::InvalidOffset { path, offset, size });
                }
                let start = offset as usize;
                let end = start + bytes.len();
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(bytes);
                *modified = Utc::now();
                Ok(())
            }
            None => {
                if offset > 0 {
                    return Err(ConnectionError::InvalidOffset {
                        path,
                        offset,
                        size: 0,
                    });
                }
                Self::ensure_parents(&mut nodes, &path)?;
                let now = Utc::now();
                nodes.insert(
                    path,
                    Node::File {
                        data: bytes.to_vec(),
                        created: now,
                        modified: now,
                        accessed: now,
                    },
                );
                Ok(())
            }
        }
    }

    fn delete(&self, path: &str) -> ConnectionResult<bool> {
        let path = normalize(path);
        let mut nodes = self.nodes.write().map_err(|_| Self::poisoned())?;

        if path == "/" || !nodes.contains_key(&path) {
            return Ok(false);
        }
        nodes.retain(|candidate, _| candidate != &path && !Self::is_descendant(candidate, &path));
        Ok(true)
    }

    fn copy(&self, source: &str, target: &str) -> ConnectionResult<()> {
        let (source, target) = (normalize(source), normalize(target));
        let mut nodes = self.nodes.write().map_err(|_| Self::poisoned())?;

        if nodes.contains_key(&target) {
            return Err(ConnectionError::AlreadyExists(target));
        }
        let entries = Self::subtree(&nodes, &source, &target)?;
        Self::ensure_parents(&mut nodes, &target)?;
        nodes.extend(entries);
        Ok(())
    }

    fn r#move(&self, source: &str, target: &str) -> ConnectionResult<()> {
        let (source, target) = (normalize(source), normalize(target));
        let mut nodes = self.nodes.write().map_err(|_| Self::poisoned())?;

        if nodes.contains_key(&target) {
            return Err(ConnectionError::AlreadyExists(target));
        }
        let entries = Self::subtree(&nodes, &source, &target)?;
        Self::check_parents(&nodes, &target)?;
        nodes.retain(|candidate, _| {
            candidate != &source && !Self::is_descendant(candidate, &source)
        });
        Self::ensure_parents(&mut nodes, &target)?;
        nodes.extend(entries);
        Ok(())
    }

    fn exists(&self, path: &str) -> ConnectionResult<bool> {
        let nodes = self.nodes.read().map_err(|_| Self::poisoned())?;
        Ok(nodes.contains_key(&normalize(path)))
    }

    fn size(&self, path: &str) -> ConnectionResult<Option<u64>> {
        let nodes = self.nodes.read().map_err(|_| Self::poisoned())?;
        Ok(match nodes.get(&normalize(path)) {
            Some(Node::File { data, .. }) => Some(data.len() as u64),
            _ => None,
        })
    }
}

/// Volatile transaction journal
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<HashMap<Uuid, TransactionRecord>>,
    attached: Mutex<HashSet<Uuid>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> ConnectionError {
        ConnectionError::journal("memory journal lock poisoned")
    }
}

impl TransactionJournal for MemoryJournal {
    fn save(&self, record: &TransactionRecord) -> ConnectionResult<()> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn load(&self, id: Uuid) -> ConnectionResult<Option<TransactionRecord>> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.get(&id).cloned())
    }

    fn remove(&self, id: Uuid) -> ConnectionResult<()> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.remove(&id);
        Ok(())
    }

    fn records(&self) -> ConnectionResult<Vec<TransactionRecord>> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.values().cloned().collect())
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
