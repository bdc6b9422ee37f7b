//! # ACL Authorization
//!
//! Grants are `(user, owner, permissions)` rules; owner `*` matches every
//! owner. A session has the requested permissions on an owner when the
//! union of its user's matching rules contains all of them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::provider::{AuthenticationInfoProvider, AuthorizationInfoProvider};
use crate::core::Permissions;

/// Owner wildcard
pub const ANY_OWNER: &str = "*";

/// One ACL grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub user_id: String,
    pub owner: String,
    pub permissions: Permissions,
}

impl AclRule {
    pub fn matches(&self, user_id: &str, owner: &str) -> bool {
        self.user_id == user_id && (self.owner == ANY_OWNER || self.owner == owner)
    }
}

/// Authorization provider over a static rule list
pub struct AclAuthorizationProvider {
    authenticator: Arc<dyn AuthenticationInfoProvider>,
    rules: Vec<AclRule>,
}

impl AclAuthorizationProvider {
    pub fn new(authenticator: Arc<dyn AuthenticationInfoProvider>, rules: Vec<AclRule>) -> Self {
        Self {
            authenticator,
            rules,
        }
    }

    /// Union of permissions `user_id` holds on `owner`
    pub fn effective_permissions(&self, user_id: &str, owner: &str) -> Permissions {
        self.rules
            .iter()
            .filter(|rule| rule.matches(user_id, owner))
            .fold(Permissions::NONE, |acc, rule| acc.union(rule.permissions))
    }
}

impl AuthorizationInfoProvider for AclAuthorizationProvider {
    fn has_rights(
        &self,
        session_token: Option<&str>,
        owner: &str,
        permissions: Permissions,
    ) -> bool {
        let Some(user_id) = session_token.and_then(|token| self.authenticator.user_of(token))
        else {
            return false;
        };
        self.effective_permissions(&user_id, owner)
            .contains_all(permissions)
    }
}
