//! Chain Proxies
//!
//! The links ahead of the executor. Each either forwards the operation
//! unchanged or fails without calling the next link.

pub mod authorization;
pub mod logging;
pub mod validation;

pub use authorization::{required_rights, AuthorizationProxy, RightsCheck};
pub use logging::LoggingProxy;
pub use validation::{check_path, ValidationProxy};
