use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use blob_store::{BlobStorage, BlobStorageError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{codec::SecurePath, SecureLinkError};

/// One issued secure link. Owned exclusively by the registry's store;
/// `bucket_name` and `object_key` are immutable after creation and
/// `access_count` only ever increases.
#[derive(Debug, Clone, Serialize)]
pub struct SecureUrlMapping {
    pub id: String,
    pub original_url: String,
    pub bucket_name: String,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
    pub access_count: u32,
}

impl SecureUrlMapping {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return false;
            }
        }
        if let Some(max) = self.max_accesses {
            if self.access_count >= max {
                return false;
            }
        }
        true
    }
}

/// Backing location handed back to the resolver on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub bucket_name: String,
    pub object_key: String,
    pub original_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
}

/// Listing entry. Presence here does not imply liveness: a mapping can sit
/// expired until the next sweep, so `expires_at` is authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub id: String,
    pub bucket_name: String,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
    pub access_count: u32,
}

impl From<&SecureUrlMapping> for LinkSummary {
    fn from(m: &SecureUrlMapping) -> Self {
        Self {
            id: m.id.clone(),
            bucket_name: m.bucket_name.clone(),
            object_key: m.object_key.clone(),
            created_at: m.created_at,
            expires_at: m.expires_at,
            max_accesses: m.max_accesses,
            access_count: m.access_count,
        }
    }
}

#[derive(Debug)]
pub enum ResolveOutcome {
    Resolved(SecureUrlMapping),
    Missing,
    Expired,
    Exhausted,
}

/// Storage seam for the mapping set. The in-memory implementation is the
/// reference; a shared external key-value store can be slotted in when
/// single-instance volatility is not acceptable.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn insert(&self, mapping: SecureUrlMapping);

    async fn fetch(&self, id: &str) -> Option<SecureUrlMapping>;

    /// The resolve critical section: liveness check and access-count
    /// increment as one atomic step per id. Expired and exhausted mappings
    /// are removed here, never resurrected.
    async fn resolve_once(&self, id: &str, now: DateTime<Utc>) -> ResolveOutcome;

    /// Returns whether the mapping existed.
    async fn remove(&self, id: &str) -> bool;

    /// Removes every non-live mapping, returning how many were dropped.
    async fn sweep(&self, now: DateTime<Utc>) -> usize;

    async fn list(&self) -> Vec<SecureUrlMapping>;
}

/// Reference store: one process, one map, one lock. The global write lock is
/// the whole concurrency story and is sufficient at expected load.
#[derive(Default)]
pub struct InMemoryMappingStore {
    mappings: RwLock<HashMap<String, SecureUrlMapping>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn insert(&self, mapping: SecureUrlMapping) {
        self.mappings
            .write()
            .await
            .insert(mapping.id.clone(), mapping);
    }

    async fn fetch(&self, id: &str) -> Option<SecureUrlMapping> {
        self.mappings.read().await.get(id).cloned()
    }

    async fn resolve_once(&self, id: &str, now: DateTime<Utc>) -> ResolveOutcome {
        let mut mappings = self.mappings.write().await;
        let Some(mapping) = mappings.get_mut(id) else {
            return ResolveOutcome::Missing;
        };
        if let Some(expires_at) = mapping.expires_at {
            if expires_at <= now {
                mappings.remove(id);
                return ResolveOutcome::Expired;
            }
        }
        if let Some(max) = mapping.max_accesses {
            if mapping.access_count >= max {
                mappings.remove(id);
                return ResolveOutcome::Exhausted;
            }
        }
        mapping.access_count += 1;
        ResolveOutcome::Resolved(mapping.clone())
    }

    async fn remove(&self, id: &str) -> bool {
        self.mappings.write().await.remove(id).is_some()
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut mappings = self.mappings.write().await;
        let before = mappings.len();
        mappings.retain(|_, m| m.is_live_at(now));
        before - mappings.len()
    }

    async fn list(&self) -> Vec<SecureUrlMapping> {
        self.mappings.read().await.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub expiry: Option<Duration>,
    pub max_accesses: Option<u32>,
    /// Overrides the returned path only; the mapping is still stored under
    /// the generated secure id.
    pub custom_path: Option<String>,
}

pub struct SecureLinkRegistry {
    store: Arc<dyn MappingStore>,
    storage: Arc<BlobStorage>,
}

impl SecureLinkRegistry {
    pub fn new(store: Arc<dyn MappingStore>, storage: Arc<BlobStorage>) -> Self {
        Self { store, storage }
    }

    pub fn in_memory(storage: Arc<BlobStorage>) -> Self {
        Self::new(Arc::new(InMemoryMappingStore::new()), storage)
    }

    pub fn store(&self) -> Arc<dyn MappingStore> {
        self.store.clone()
    }

    /// Mints a secure path for an existing object. The object must be
    /// stat-able right now; nothing is inserted otherwise.
    pub async fn issue(
        &self,
        bucket_name: &str,
        object_key: &str,
        original_url: &str,
        options: IssueOptions,
    ) -> Result<String, SecureLinkError> {
        self.storage.stat(object_key).await.map_err(|e| match e {
            BlobStorageError::NotFound(_) => SecureLinkError::ObjectNotFound {
                bucket: bucket_name.to_string(),
                key: object_key.to_string(),
            },
            other => SecureLinkError::StorageUnavailable(other.to_string()),
        })?;

        let now = Utc::now();
        let path = SecurePath::derive(bucket_name, object_key, now.timestamp_millis() as u64);
        let expires_at = match options.expiry {
            Some(expiry) => Some(
                now + chrono::Duration::from_std(expiry)
                    .map_err(|e| SecureLinkError::StorageUnavailable(e.to_string()))?,
            ),
            None => None,
        };
        let mapping = SecureUrlMapping {
            id: path.secure_id.clone(),
            original_url: original_url.to_string(),
            bucket_name: bucket_name.to_string(),
            object_key: object_key.to_string(),
            created_at: now,
            expires_at,
            max_accesses: options.max_accesses,
            access_count: 0,
        };
        self.store.insert(mapping).await;
        info!(
            secure_id = %path.secure_id,
            bucket = bucket_name,
            key = object_key,
            "issued secure link"
        );

        Ok(options.custom_path.unwrap_or_else(|| path.to_uri_path()))
    }

    /// Validates a presented triple and, when live, counts the access and
    /// returns the backing location. Every failure mode collapses to
    /// `NotFound`; callers cannot tell tampering from expiry.
    pub async fn resolve(
        &self,
        secure_id: &str,
        timestamp: &str,
        hash: &str,
    ) -> Result<ResolvedLink, SecureLinkError> {
        let Some(mapping) = self.store.fetch(secure_id).await else {
            return Err(SecureLinkError::NotFound);
        };
        if !SecurePath::verify(&mapping.bucket_name, &mapping.object_key, timestamp, hash) {
            debug!(secure_id, "secure path failed integrity check");
            return Err(SecureLinkError::NotFound);
        }
        match self.store.resolve_once(secure_id, Utc::now()).await {
            ResolveOutcome::Resolved(m) => Ok(ResolvedLink {
                bucket_name: m.bucket_name,
                object_key: m.object_key,
                original_url: m.original_url,
            }),
            ResolveOutcome::Missing => Err(SecureLinkError::NotFound),
            ResolveOutcome::Expired => {
                debug!(secure_id, "secure link expired");
                Err(SecureLinkError::NotFound)
            }
            ResolveOutcome::Exhausted => {
                debug!(secure_id, "secure link access count exhausted");
                Err(SecureLinkError::NotFound)
            }
        }
    }

    /// Unconditional removal; returns whether the mapping existed.
    pub async fn invalidate(&self, secure_id: &str) -> bool {
        self.store.remove(secure_id).await
    }

    /// Read-only snapshot; never touches the access count.
    pub async fn stats(&self, secure_id: &str) -> Option<LinkStats> {
        self.store.fetch(secure_id).await.map(|m| LinkStats {
            access_count: m.access_count,
            created_at: m.created_at,
            expires_at: m.expires_at,
            max_accesses: m.max_accesses,
        })
    }

    pub async fn list_active(&self) -> Vec<LinkSummary> {
        self.store
            .list()
            .await
            .iter()
            .map(LinkSummary::from)
            .collect()
    }
}
