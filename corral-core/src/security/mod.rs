pub mod error;
pub mod manager;
pub mod patterns;
pub mod resolver;
pub mod sanitize;
pub mod types;

pub use error::{MatchTimeoutError, PathSecurityError, SecurityReason};
pub use manager::PathSecurityManager;
pub use resolver::{ResolverConfig, ResolverMetrics, SymlinkResolver};
pub use sanitize::{CredentialSanitizer, REDACTED};
pub use types::{SecurityConfig, SecurityMode};
