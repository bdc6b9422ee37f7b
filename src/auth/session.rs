//! # Session Management
//!
//! In-memory session table keyed by the SHA-256 hash of the token.
//! Sessions expire at the stated time and logout invalidates immediately.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use super::crypto::{generate_token, hash_token};
use super::errors::{AuthError, AuthResult};

/// Session model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// User this session belongs to
    pub user_id: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session table
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> AuthError {
        AuthError::StoreError("session table lock poisoned".to_string())
    }

    /// Create a session for `user_id`
    ///
    /// Returns the raw token; only its hash is kept.
    pub fn create(&self, user_id: &str) -> AuthResult<String> {
        let token = generate_token();
        let now = Utc::now();
        let session = Session {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        sessions.insert(hash_token(&token), session);
        Ok(token)
    }

    /// Look up a live session
    pub fn validate(&self, token: &str) -> AuthResult<Session> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        match sessions.get(&hash_token(token)) {
            Some(session) if !session.is_expired(Utc::now()) => Ok(session.clone()),
            _ => Err(AuthError::SessionInvalid),
        }
    }

    /// Returns false if the token was unknown
    pub fn revoke(&self, token: &str) -> AuthResult<bool> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        Ok(sessions.remove(&hash_token(token)).is_some())
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> AuthResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        Ok(before - sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
