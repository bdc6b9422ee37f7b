//! Gateway configuration
//!
//! A single JSON file. Every field except the two access keys has a
//! default; values are validated after load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::crypto::{generate_token, is_valid_hash};
use crate::auth::AclRule;
use crate::connection::{ConnectionResult, StorageConnectionFactory};
use crate::http_server::HttpServerConfig;
use crate::observability::{LogFormat, Severity};
use crate::pool::CheckoutPolicy;

/// Result type for configuration handling
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Config file {0} already exists")]
    AlreadyExists(PathBuf),
}

/// Physical backend behind every connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Local { root: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("./afs-data"),
        }
    }
}

impl StorageConfig {
    pub fn connection_factory(&self) -> ConnectionResult<StorageConnectionFactory> {
        match self {
            StorageConfig::Memory => Ok(StorageConnectionFactory::memory()),
            StorageConfig::Local { root } => StorageConnectionFactory::local(root.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// `null` blocks, `0` fails fast, `n` waits up to n ms
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub user_id: String,
    /// Argon2 PHC string, see `afsgate hash-password`
    pub password_hash: String,
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_max_size")]
    pub max_read_size_in_bytes: u64,

    #[serde(default = "default_max_size")]
    pub max_write_size_in_bytes: u64,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default = "default_worker_idle_timeout_ms")]
    pub worker_idle_timeout_ms: u64,

    pub interactive_session_key: String,

    pub transaction_manager_key: String,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default)]
    pub users: Vec<UserEntry>,

    #[serde(default)]
    pub acl: Vec<AclRule>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}
fn default_max_workers() -> usize {
    16
}
fn default_checkout_timeout_ms() -> Option<u64> {
    Some(30_000)
}
fn default_worker_idle_timeout_ms() -> u64 {
    30_000
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl GatewayConfig {
    /// Defaults with freshly generated access keys
    pub fn generate() -> Self {
        Self {
            http: HttpServerConfig::default(),
            storage: StorageConfig::default(),
            max_read_size_in_bytes: default_max_size(),
            max_write_size_in_bytes: default_max_size(),
            pool: PoolConfig::default(),
            worker_idle_timeout_ms: default_worker_idle_timeout_ms(),
            interactive_session_key: generate_token(),
            transaction_manager_key: generate_token(),
            session_ttl_secs: default_session_ttl_secs(),
            users: Vec::new(),
            acl: Vec::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: GatewayConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration to a new file; never overwrites
    pub fn write_new(&self, path: &Path) -> ConfigResult<()> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.max_read_size_in_bytes == 0 {
            return invalid("max_read_size_in_bytes must be > 0".into());
        }
        if self.max_write_size_in_bytes == 0 {
            return invalid("max_write_size_in_bytes must be > 0".into());
        }
        if self.pool.max_workers == 0 {
            return invalid("pool.max_workers must be > 0".into());
        }
        if self.interactive_session_key.is_empty() || self.transaction_manager_key.is_empty() {
            return invalid("interactive_session_key and transaction_manager_key must not be empty".into());
        }
        if self.interactive_session_key == self.transaction_manager_key {
            return invalid("interactive_session_key and transaction_manager_key must differ".into());
        }
        if self.session_ttl_secs == 0 {
            return invalid("session_ttl_secs must be > 0".into());
        }
        if Severity::parse(&self.log_level).is_none() {
            return invalid(format!("Unknown log_level '{}'", self.log_level));
        }
        if LogFormat::parse(&self.log_format).is_none() {
            return invalid(format!(
                "Unknown log_format '{}', expected 'json' or 'pretty'",
                self.log_format
            ));
        }
        self.http.validate().map_err(ConfigError::Invalid)?;
        for user in &self.users {
            if !is_valid_hash(&user.password_hash) {
                return invalid(format!(
                    "password_hash for user '{}' is not an argon2 PHC string",
                    user.user_id
                ));
            }
        }
        Ok(())
    }

    pub fn checkout_policy(&self) -> CheckoutPolicy {
        CheckoutPolicy::from_timeout_ms(self.pool.checkout_timeout_ms)
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.min(i64::MAX as u64 / 1000) as i64)
    }

    /// user id → password hash
    pub fn user_table(&self) -> HashMap<String, String> {
        self.users
            .iter()
            .map(|u| (u.user_id.clone(), u.password_hash.clone()))
            .collect()
    }

    pub fn severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }

    pub fn format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format).unwrap_or(LogFormat::Pretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{
        "interactive_session_key": "interactive",
        "transaction_manager_key": "manager"
    }"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = GatewayConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.max_read_size_in_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pool.max_workers, 16);
        assert_eq!(config.checkout_policy(), CheckoutPolicy::Wait(Duration::from_millis(30_000)));
        assert_eq!(config.worker_idle_timeout(), Duration::from_secs(30));
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_storage_kinds() {
        let config = GatewayConfig::from_json(
            r#"{"interactive_session_key":"a","transaction_manager_key":"b","storage":{"kind":"memory"}}"#,
        )
        .unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);

        let config = GatewayConfig::from_json(
            r#"{"interactive_session_key":"a","transaction_manager_key":"b","storage":{"kind":"local","root":"/srv/afs"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                root: PathBuf::from("/srv/afs")
            }
        );
    }

    #[test]
    fn test_null_timeout_blocks() {
        let config = GatewayConfig::from_json(
            r#"{"interactive_session_key":"a","transaction_manager_key":"b","pool":{"checkout_timeout_ms":null}}"#,
        )
        .unwrap();
        assert_eq!(config.checkout_policy(), CheckoutPolicy::Block);
    }

    #[test]
    fn test_missing_keys_rejected() {
        assert!(matches!(
            GatewayConfig::from_json("{}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_read = r#"{"interactive_session_key":"a","transaction_manager_key":"b","max_read_size_in_bytes":0}"#;
        assert!(matches!(
            GatewayConfig::from_json(zero_read),
            Err(ConfigError::Invalid(_))
        ));

        let same_keys = r#"{"interactive_session_key":"a","transaction_manager_key":"a"}"#;
        assert!(GatewayConfig::from_json(same_keys).is_err());

        let bad_hash = r#"{"interactive_session_key":"a","transaction_manager_key":"b","users":[{"user_id":"alice","password_hash":"plain"}]}"#;
        assert!(GatewayConfig::from_json(bad_hash).is_err());

        let bad_format = r#"{"interactive_session_key":"a","transaction_manager_key":"b","log_format":"xml"}"#;
        assert!(GatewayConfig::from_json(bad_format).is_err());

        let bad_origin = r#"{"interactive_session_key":"a","transaction_manager_key":"b","http":{"cors_origins":["*"]}}"#;
        assert!(GatewayConfig::from_json(bad_origin).is_err());
    }

    #[test]
    fn test_write_new_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("afsgate.json");

        let config = GatewayConfig::generate();
        config.write_new(&path).unwrap();
        let loaded = GatewayConfig::load(&path).unwrap();
        assert_eq!(loaded.interactive_session_key, config.interactive_session_key);

        assert!(matches!(
            config.write_new(&path),
            Err(ConfigError::AlreadyExists(_))
        ));
    }
}
