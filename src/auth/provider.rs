//! # Provider Traits
//!
//! The seams the gateway consults for identity and permissions.

use std::collections::HashMap;

use chrono::Duration;

use super::crypto::verify_password;
use super::errors::{AuthError, AuthResult};
use super::session::SessionStore;
use crate::core::Permissions;

/// Answers whether a session may act on an owner's files
pub trait AuthorizationInfoProvider: Send + Sync {
    fn has_rights(&self, session_token: Option<&str>, owner: &str, permissions: Permissions)
        -> bool;
}

/// Session lifecycle behind `login`, `logout` and `isSessionValid`
pub trait AuthenticationInfoProvider: Send + Sync {
    /// Returns a new session token
    fn login(&self, user_id: &str, password: &str) -> AuthResult<String>;

    /// Returns false if the token was not a live session
    fn logout(&self, session_token: &str) -> AuthResult<bool>;

    fn is_session_valid(&self, session_token: &str) -> bool;

    /// User behind a live session
    fn user_of(&self, session_token: &str) -> Option<String>;

    /// Forget expired sessions; returns how many were dropped
    fn purge_expired(&self) -> AuthResult<usize>;
}

/// Password table plus session store
#[derive(Debug)]
pub struct LocalAuthenticator {
    /// user id → argon2 PHC hash
    users: HashMap<String, String>,
    sessions: SessionStore,
}

impl LocalAuthenticator {
    pub fn new(users: HashMap<String, String>, session_ttl: Duration) -> Self {
        Self {
            users,
            sessions: SessionStore::new(session_ttl),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

impl AuthenticationInfoProvider for LocalAuthenticator {
    fn login(&self, user_id: &str, password: &str) -> AuthResult<String> {
        let hash = self
            .users
            .get(user_id)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(user_id, password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.sessions.create(user_id)
    }

    fn logout(&self, session_token: &str) -> AuthResult<bool> {
        self.sessions.revoke(session_token)
    }

    fn is_session_valid(&self, session_token: &str) -> bool {
        self.sessions.validate(session_token).is_ok()
    }

    fn user_of(&self, session_token: &str) -> Option<String> {
        self.sessions
            .validate(session_token)
            .ok()
            .map(|session| session.user_id)
    }

    fn purge_expired(&self) -> AuthResult<usize> {
        self.sessions.purge_expired()
    }
}
