use std::{sync::Arc, time::Duration};

use blob_store::{BlobStorage, BlobStorageError};
use chrono::{DateTime, Utc};
use secure_links::{IssueOptions, SecureLinkRegistry};
use thiserror::Error;
use tracing::warn;

use crate::{
    config::LinkPolicyConfig,
    http_objects::{FileRecord, LinkClass, Visibility},
};

/// Single fault surfaced for every issuance failure; the caller does not get
/// to distinguish a missing object from unreachable storage.
#[derive(Debug, Error)]
#[error("failed to generate url for {object_key}")]
pub struct FailedToGenerateUrl {
    pub object_key: String,
    #[source]
    source: anyhow::Error,
}

#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
}

/// Policy layer deciding, per file, which kind of url to hand out: a stable
/// direct url for public files, a native presigned url, or a secure
/// indirection path minted by the registry.
pub struct LinkIssuer {
    storage: Arc<BlobStorage>,
    registry: Arc<SecureLinkRegistry>,
    policy: LinkPolicyConfig,
    public_base_url: String,
}

impl LinkIssuer {
    pub fn new(
        storage: Arc<BlobStorage>,
        registry: Arc<SecureLinkRegistry>,
        policy: LinkPolicyConfig,
        public_base_url: &str,
    ) -> Self {
        Self {
            storage,
            registry,
            policy,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn link_for(
        &self,
        record: &FileRecord,
        class: LinkClass,
        expiry_override: Option<Duration>,
        max_accesses_override: Option<u32>,
    ) -> Result<IssuedLink, FailedToGenerateUrl> {
        // public files are servable directly under the bucket policy; no
        // indirection, no expiry
        if record.visibility == Visibility::Public {
            return Ok(IssuedLink {
                url: self.direct_url(&record.key),
                expires_at: None,
                max_accesses: None,
            });
        }

        match class {
            LinkClass::Presigned => {
                let ttl = expiry_override
                    .unwrap_or(Duration::from_secs(self.policy.presigned_expiry_secs));
                let url = self
                    .storage
                    .presigned_get_url(&record.key, ttl)
                    .await
                    .map_err(|e| self.fault(&record.key, e.into()))?;
                Ok(IssuedLink {
                    url: url.to_string(),
                    expires_at: Some(Utc::now() + ttl),
                    max_accesses: None,
                })
            }
            LinkClass::Standard => {
                let expiry = expiry_override
                    .unwrap_or(Duration::from_secs(self.policy.standard_expiry_secs));
                self.issue_secure(record, expiry, max_accesses_override)
                    .await
            }
            LinkClass::Temporary => {
                let expiry = expiry_override
                    .unwrap_or(Duration::from_secs(self.policy.temporary_expiry_secs));
                // single-use by construction
                let max_accesses = max_accesses_override.or(Some(1));
                self.issue_secure(record, expiry, max_accesses).await
            }
        }
    }

    async fn issue_secure(
        &self,
        record: &FileRecord,
        expiry: Duration,
        max_accesses: Option<u32>,
    ) -> Result<IssuedLink, FailedToGenerateUrl> {
        let original_url = self.original_url(&record.key, expiry).await;
        let path = self
            .registry
            .issue(
                self.storage.bucket_name(),
                &record.key,
                &original_url,
                IssueOptions {
                    expiry: Some(expiry),
                    max_accesses,
                    custom_path: None,
                },
            )
            .await
            .map_err(|e| self.fault(&record.key, e.into()))?;
        Ok(IssuedLink {
            url: format!("{}{}", self.public_base_url, path),
            expires_at: Some(Utc::now() + expiry),
            max_accesses,
        })
    }

    /// Pre-resolved target recorded in the mapping: the backend's own signed
    /// url when it can sign, the direct url otherwise.
    async fn original_url(&self, key: &str, ttl: Duration) -> String {
        match self.storage.presigned_get_url(key, ttl).await {
            Ok(url) => url.to_string(),
            Err(BlobStorageError::PresignedUnsupported(_)) => self.direct_url(key),
            Err(e) => {
                warn!(key, "falling back to direct url: {e}");
                self.direct_url(key)
            }
        }
    }

    fn direct_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base_url,
            self.storage.bucket_name(),
            key
        )
    }

    fn fault(&self, key: &str, source: anyhow::Error) -> FailedToGenerateUrl {
        FailedToGenerateUrl {
            object_key: key.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::stream;

    use super::*;

    async fn issuer_with_object(dir: &std::path::Path, key: &str) -> LinkIssuer {
        let config = blob_store::BlobStorageConfig::new(dir.to_str().unwrap());
        let storage = Arc::new(BlobStorage::new(config).unwrap());
        let data = Box::pin(stream::once(async { Ok(Bytes::from("bytes")) }));
        storage.put(key, data).await.unwrap();
        let registry = Arc::new(SecureLinkRegistry::in_memory(storage.clone()));
        LinkIssuer::new(
            storage,
            registry,
            LinkPolicyConfig::default(),
            "http://localhost:8900/",
        )
    }

    fn record(key: &str, visibility: Visibility) -> FileRecord {
        FileRecord {
            key: key.to_string(),
            original_name: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 5,
            sha256_hash: String::new(),
            visibility,
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_public_file_gets_direct_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        let issuer = issuer_with_object(temp_dir.path(), "pic").await;

        let link = issuer
            .link_for(&record("pic", Visibility::Public), LinkClass::Standard, None, None)
            .await
            .unwrap();
        assert!(link.url.ends_with("/pic"));
        assert!(!link.url.contains("/secure/"));
        assert!(link.expires_at.is_none());
        assert!(link.max_accesses.is_none());
    }

    #[tokio::test]
    async fn test_standard_link_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let issuer = issuer_with_object(temp_dir.path(), "pic").await;

        let link = issuer
            .link_for(&record("pic", Visibility::Private), LinkClass::Standard, None, None)
            .await
            .unwrap();
        assert!(link.url.contains("/secure/"));
        assert!(link.max_accesses.is_none());
        let expires_at = link.expires_at.unwrap();
        let expected = Utc::now() + Duration::from_secs(24 * 60 * 60);
        assert!((expires_at - expected).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_temporary_link_is_single_use() {
        let temp_dir = tempfile::tempdir().unwrap();
        let issuer = issuer_with_object(temp_dir.path(), "pic").await;

        let link = issuer
            .link_for(&record("pic", Visibility::Private), LinkClass::Temporary, None, None)
            .await
            .unwrap();
        assert!(link.url.contains("/secure/"));
        assert_eq!(link.max_accesses, Some(1));
        let expires_at = link.expires_at.unwrap();
        let expected = Utc::now() + Duration::from_secs(15 * 60);
        assert!((expires_at - expected).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_missing_object_is_one_opaque_fault() {
        let temp_dir = tempfile::tempdir().unwrap();
        let issuer = issuer_with_object(temp_dir.path(), "pic").await;

        let err = issuer
            .link_for(&record("ghost", Visibility::Private), LinkClass::Standard, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.object_key, "ghost");
    }

    #[tokio::test]
    async fn test_presigned_fails_on_disk_backend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let issuer = issuer_with_object(temp_dir.path(), "pic").await;

        let err = issuer
            .link_for(&record("pic", Visibility::Private), LinkClass::Presigned, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.object_key, "pic");
    }
}
