//! # Authentication and Authorization
//!
//! - Argon2id password verification
//! - Random session tokens, stored hashed, with expiry
//! - ACL-based answer to "may this session touch this owner's files"

pub mod acl;
pub mod crypto;
pub mod errors;
pub mod provider;
pub mod session;

pub use acl::{AclAuthorizationProvider, AclRule, ANY_OWNER};
pub use errors::{AuthError, AuthResult};
pub use provider::{AuthenticationInfoProvider, AuthorizationInfoProvider, LocalAuthenticator};
pub use session::{Session, SessionStore};
