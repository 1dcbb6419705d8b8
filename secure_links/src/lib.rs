//! Secure url indirection: opaque, self-verifying download paths that map to
//! objects in blob storage, with expiry and access-count limits.
//!
//! A secure path has three segments, `/secure/{id}/{timestamp}/{hash}`. The
//! 16-character random id is the unguessability guarantee and the lookup key;
//! the hash binds the timestamp segment to the backing object so a tampered
//! path fails verification. Unknown ids, tampered paths, expired mappings and
//! exhausted mappings are all reported as the same opaque `NotFound`.

use thiserror::Error;

pub mod codec;
pub mod registry;
pub mod sweep;

pub use codec::SecurePath;
pub use registry::{
    InMemoryMappingStore,
    IssueOptions,
    LinkStats,
    LinkSummary,
    MappingStore,
    ResolvedLink,
    SecureLinkRegistry,
    SecureUrlMapping,
};
pub use sweep::Sweeper;

#[derive(Debug, Error)]
pub enum SecureLinkError {
    /// The backing object was missing when issuance stat-checked it.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Blob storage could not be reached. Never retried here.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The single public resolution failure. Unknown id, tampered path,
    /// expired mapping and exhausted mapping are indistinguishable.
    #[error("secure link not found")]
    NotFound,
}
