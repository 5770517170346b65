pub mod file;
pub mod security;

// Public library API - the CLI front-end and the attachment layer consume
// these; everything else is public for integration tests but less stable.
pub use file::collect::{CollectRequest, DirectoryCollector, FileDescriptor};
pub use file::ignore::GitignoreMatcher;
pub use file::FileSource;
pub use security::error::{MatchTimeoutError, PathSecurityError, SecurityReason};
pub use security::manager::PathSecurityManager;
pub use security::resolver::{ResolverConfig, ResolverMetrics, SymlinkResolver};
pub use security::sanitize::CredentialSanitizer;
pub use security::types::{SecurityConfig, SecurityMode};
