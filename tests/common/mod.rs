//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use afsgate::auth::AuthorizationInfoProvider;
use afsgate::connection::{
    Connection, ConnectionError, ConnectionFactory, ConnectionResult, RawFile,
};
use afsgate::core::{Permissions, ProxyChain, WorkerContext};
use afsgate::observability::MetricsRegistry;
use uuid::Uuid;

/// Backend call as seen by a `RecordingConnection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String, bool),
    Read(String, u64, u32),
    Write(String, u64, usize),
    Delete(String),
    Copy(String, String),
    Move(String, String),
    Begin(Uuid),
    Prepare,
    Commit,
    Rollback,
    Recover,
}

/// Connection that records every call and answers with canned values
#[derive(Debug, Default)]
pub struct RecordingConnection {
    pub calls: Arc<Mutex<Vec<Call>>>,
    transaction: Option<Uuid>,
}

impl RecordingConnection {
    pub fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
        let connection = Self::default();
        let calls = Arc::clone(&connection.calls);
        (connection, calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Connection for RecordingConnection {
    fn list(&mut self, path: &str, recursively: bool) -> ConnectionResult<Vec<RawFile>> {
        self.record(Call::List(path.to_string(), recursively));
        Ok(Vec::new())
    }

    fn read(&mut self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>> {
        self.record(Call::Read(path.to_string(), offset, limit));
        Ok(b"data".to_vec())
    }

    fn write(
        &mut self,
        path: &str,
        offset: u64,
        data: &[u8],
        _md5_hash: &[u8],
    ) -> ConnectionResult<bool> {
        self.record(Call::Write(path.to_string(), offset, data.len()));
        Ok(true)
    }

    fn delete(&mut self, path: &str) -> ConnectionResult<bool> {
        self.record(Call::Delete(path.to_string()));
        Ok(true)
    }

    fn copy(&mut self, source: &str, target: &str) -> ConnectionResult<bool> {
        self.record(Call::Copy(source.to_string(), target.to_string()));
        Ok(true)
    }

    fn r#move(&mut self, source: &str, target: &str) -> ConnectionResult<bool> {
        self.record(Call::Move(source.to_string(), target.to_string()));
        Ok(true)
    }

    fn begin(&mut self, transaction_id: Uuid) -> ConnectionResult<()> {
        self.record(Call::Begin(transaction_id));
        self.transaction = Some(transaction_id);
        Ok(())
    }

    fn prepare(&mut self) -> ConnectionResult<bool> {
        self.record(Call::Prepare);
        Ok(true)
    }

    fn commit(&mut self) -> ConnectionResult<()> {
        self.record(Call::Commit);
        self.transaction = None;
        Ok(())
    }

    fn rollback(&mut self) -> ConnectionResult<()> {
        self.record(Call::Rollback);
        self.transaction = None;
        Ok(())
    }

    fn recover(&mut self) -> ConnectionResult<Vec<Uuid>> {
        self.record(Call::Recover);
        Ok(Vec::new())
    }

    fn transaction_id(&self) -> Option<Uuid> {
        self.transaction
    }
}

/// Grants a fixed permission set per owner and records every question
#[derive(Debug, Default)]
pub struct FixedRights {
    grants: HashMap<String, Permissions>,
    pub asked: Mutex<Vec<(String, Permissions)>>,
}

impl FixedRights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, owner: &str, permissions: Permissions) -> Self {
        self.grants.insert(owner.to_string(), permissions);
        self
    }
}

impl AuthorizationInfoProvider for FixedRights {
    fn has_rights(
        &self,
        _session_token: Option<&str>,
        owner: &str,
        permissions: Permissions,
    ) -> bool {
        self.asked
            .lock()
            .unwrap()
            .push((owner.to_string(), permissions));
        self.grants
            .get(owner)
            .is_some_and(|granted| granted.contains_all(permissions))
    }
}

/// Standard chain over `provider` with the given read limit
pub fn chain(provider: Arc<FixedRights>, max_read_size_in_bytes: u64) -> ProxyChain {
    ProxyChain::standard(
        provider,
        max_read_size_in_bytes,
        10 * 1024 * 1024,
        Arc::new(MetricsRegistry::new()),
    )
}

/// Context over a fresh recording connection
pub fn recording_context() -> (WorkerContext, Arc<Mutex<Vec<Call>>>) {
    let (connection, calls) = RecordingConnection::new();
    (
        WorkerContext::new(Box::new(connection)).with_session_token("token"),
        calls,
    )
}

/// Password hash for `password`, for user tables in test configs
pub fn hash(password: &str) -> String {
    afsgate::auth::crypto::hash_password(password).unwrap()
}

/// Raw md5 digest of `data`
pub fn md5_of(data: &[u8]) -> Vec<u8> {
    md5::compute(data).0.to_vec()
}

/// Factory whose connections all log into one shared call list
#[derive(Debug, Default)]
pub struct RecordingFactory {
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl ConnectionFactory for RecordingFactory {
    fn connect(&self) -> ConnectionResult<Box<dyn Connection>> {
        Ok(Box::new(RecordingConnection {
            calls: Arc::clone(&self.calls),
            transaction: None,
        }))
    }
}

/// Factory over a fixed set of files, for failure paths the real
/// backends cannot produce on demand
#[derive(Debug, Clone, Default)]
pub struct FixtureFactory {
    /// (physical path, content)
    pub files: Vec<(String, Vec<u8>)>,
    /// Reads of this physical path fail
    pub broken: Option<String>,
    pub panic_on_list: bool,
}

impl FixtureFactory {
    /// `count` small files directly under `/alice`
    pub fn with_files(count: usize) -> Self {
        Self {
            files: (0..count)
                .map(|i| (format!("/alice/f{:03}.bin", i), vec![i as u8; 64]))
                .collect(),
            ..Self::default()
        }
    }
}

impl ConnectionFactory for FixtureFactory {
    fn connect(&self) -> ConnectionResult<Box<dyn Connection>> {
        Ok(Box::new(FixtureConnection {
            fixture: self.clone(),
            transaction: None,
        }))
    }
}

pub struct FixtureConnection {
    fixture: FixtureFactory,
    transaction: Option<Uuid>,
}

impl Connection for FixtureConnection {
    fn list(&mut self, _path: &str, _recursively: bool) -> ConnectionResult<Vec<RawFile>> {
        if self.fixture.panic_on_list {
            panic!("backend exploded");
        }
        Ok(self
            .fixture
            .files
            .iter()
            .map(|(path, data)| RawFile {
                path: path.clone(),
                name: path.rsplit('/').next().unwrap_or_default().to_string(),
                directory: false,
                size: Some(data.len() as u64),
                last_modified_time: None,
                creation_time: None,
                last_access_time: None,
            })
            .collect())
    }

    fn read(&mut self, path: &str, offset: u64, limit: u32) -> ConnectionResult<Vec<u8>> {
        if self.fixture.broken.as_deref() == Some(path) {
            return Err(ConnectionError::Io(std::io::Error::other("disk unplugged")));
        }
        let (_, data) = self
            .fixture
            .files
            .iter()
            .find(|(candidate, _)| candidate == path)
            .ok_or_else(|| ConnectionError::NotFound(path.to_string()))?;
        let start = (offset as usize).min(data.len());
        let end = (start + limit as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn write(&mut self, _: &str, _: u64, _: &[u8], _: &[u8]) -> ConnectionResult<bool> {
        Ok(false)
    }

    fn delete(&mut self, _: &str) -> ConnectionResult<bool> {
        Ok(false)
    }

    fn copy(&mut self, _: &str, _: &str) -> ConnectionResult<bool> {
        Ok(false)
    }

    fn r#move(&mut self, _: &str, _: &str) -> ConnectionResult<bool> {
        Ok(false)
    }

    fn begin(&mut self, transaction_id: Uuid) -> ConnectionResult<()> {
        self.transaction = Some(transaction_id);
        Ok(())
    }

    fn prepare(&mut self) -> ConnectionResult<bool> {
        Ok(true)
    }

    fn commit(&mut self) -> ConnectionResult<()> {
        self.transaction = None;
        Ok(())
    }

    fn rollback(&mut self) -> ConnectionResult<()> {
        self.transaction = None;
        Ok(())
    }

    fn recover(&mut self) -> ConnectionResult<Vec<Uuid>> {
        Ok(Vec::new())
    }

    fn transaction_id(&self) -> Option<Uuid> {
        self.transaction
    }
}

pub const INTERACTIVE_KEY: &str = "interactive-key";
pub const MANAGER_KEY: &str = "manager-key";

/// Gateway configuration over in-memory storage with one user, "alice",
/// who owns her own files
pub fn gateway_config(password: &str) -> afsgate::config::GatewayConfig {
    let json = serde_json::json!({
        "interactive_session_key": INTERACTIVE_KEY,
        "transaction_manager_key": MANAGER_KEY,
        "storage": {"kind": "memory"},
        "max_read_size_in_bytes": 1024,
        "pool": {"max_workers": 2, "checkout_timeout_ms": 0},
        "users": [{"user_id": "alice", "password_hash": hash(password)}],
        "acl": [{"user_id": "alice", "owner": "alice", "permissions": ["Read", "Write"]}],
    });
    afsgate::config::GatewayConfig::from_json(&json.to_string()).unwrap()
}
