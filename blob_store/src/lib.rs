use std::{env, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};
use object_store::{
    aws::{AmazonS3, AmazonS3Builder, AmazonS3ConfigKey},
    parse_url,
    path::Path,
    signer::Signer,
    ObjectStore,
    ObjectStoreScheme,
    WriteMultipart,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;
use url::Url;

#[derive(Debug, Error)]
pub enum BlobStorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("presigned urls are not supported by the {0} backend")]
    PresignedUnsupported(&'static str),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl BlobStorageError {
    fn from_store(key: &str, err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound(key.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    pub path: Option<String>,
}

impl BlobStorageConfig {
    pub fn new(path: &str) -> Self {
        BlobStorageConfig {
            path: Some(format!("file://{}", path)),
        }
    }
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        let blob_store_path = format!(
            "file://{}",
            env::current_dir()
                .unwrap()
                .join("sealbox_storage/blobs")
                .to_str()
                .unwrap()
        );
        info!("using blob store path: {}", blob_store_path);
        BlobStorageConfig {
            path: Some(blob_store_path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub key: String,
    pub size_bytes: u64,
    pub sha256_hash: String,
}

/// Subset of object metadata surfaced to callers. Content type is not
/// recorded by the store and travels with the file record instead.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectStat {
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BlobStorage {
    object_store: Arc<dyn ObjectStore>,
    // present only for backends that can sign urls natively
    signer: Option<Arc<AmazonS3>>,
    path: Path,
    bucket: String,
}

impl BlobStorage {
    pub fn new(config: BlobStorageConfig) -> Result<Self, BlobStorageError> {
        let url_str = config
            .path
            .ok_or_else(|| BlobStorageError::Unavailable("blob store path not set".into()))?;
        let url = url_str
            .parse::<Url>()
            .map_err(|e| BlobStorageError::Unavailable(format!("invalid blob store url: {e}")))?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)
            .map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;

        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // environment credentials take precedence over instance metadata
                let opts: Vec<(AmazonS3ConfigKey, String)> = env::vars()
                    .filter(|(key, _)| key.starts_with("AWS_"))
                    .filter_map(|(key, value)| {
                        key.to_ascii_lowercase().parse().ok().map(|k| (k, value))
                    })
                    .collect();
                let mut builder = AmazonS3Builder::new().with_url(url_str.as_str());
                for (key, value) in opts.iter() {
                    builder = builder.with_config(*key, value.clone());
                }
                // localstack/minio endpoints are plain http
                if let Ok(endpoint) = env::var("AWS_ENDPOINT_URL") {
                    builder = builder.with_allow_http(endpoint.starts_with("http://"));
                }
                let s3 = Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobStorageError::Unavailable(e.to_string()))?,
                );
                let bucket = url.host_str().unwrap_or_default().to_string();
                let path = Path::from(url.path());
                Ok(Self {
                    object_store: s3.clone(),
                    signer: Some(s3),
                    path,
                    bucket,
                })
            }
            _ => {
                let (object_store, path) =
                    parse_url(&url).map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;
                let bucket = path
                    .parts()
                    .last()
                    .map(|p| p.as_ref().to_string())
                    .unwrap_or_else(|| "local".to_string());
                Ok(Self {
                    object_store: Arc::new(object_store),
                    signer: None,
                    path,
                    bucket,
                })
            }
        }
    }

    /// Logical bucket name of this store, recorded in issued mappings.
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    fn object_path(&self, key: &str) -> Path {
        let root = self.path.as_ref();
        if root.is_empty() {
            Path::from(key)
        } else {
            Path::from(format!("{}/{}", root, key))
        }
    }

    pub async fn put(
        &self,
        key: &str,
        mut data: impl futures::Stream<Item = Result<Bytes, BlobStorageError>> + Send + Unpin,
    ) -> Result<PutResult, BlobStorageError> {
        let path = self.object_path(key);
        let upload = self
            .object_store
            .put_multipart(&path)
            .await
            .map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;
        let mut writer = WriteMultipart::new(upload);
        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            writer
                .wait_for_capacity(1)
                .await
                .map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;
            hasher.update(&chunk);
            size_bytes += chunk.len() as u64;
            writer.write(&chunk);
        }
        writer
            .finish()
            .await
            .map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;

        Ok(PutResult {
            key: key.to_string(),
            size_bytes,
            sha256_hash: format!("{:x}", hasher.finalize()),
        })
    }

    pub async fn get(
        &self,
        key: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, BlobStorageError>>, BlobStorageError> {
        let path = self.object_path(key);
        let get_result = self
            .object_store
            .get(&path)
            .await
            .map_err(|e| BlobStorageError::from_store(key, e))?;
        let key = key.to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = get_result.into_stream();
            while let Some(chunk) = stream.next().await {
                let _ = tx.send(chunk.map_err(|e| BlobStorageError::from_store(&key, e)));
            }
        });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    pub async fn read_bytes(&self, key: &str) -> Result<Bytes, BlobStorageError> {
        let mut reader = self.get(key).await?;
        let mut bytes = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes.into())
    }

    pub async fn stat(&self, key: &str) -> Result<ObjectStat, BlobStorageError> {
        let meta = self
            .object_store
            .head(&self.object_path(key))
            .await
            .map_err(|e| BlobStorageError::from_store(key, e))?;
        Ok(ObjectStat {
            size_bytes: meta.size,
            last_modified: meta.last_modified,
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool, BlobStorageError> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(BlobStorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), BlobStorageError> {
        self.object_store
            .delete(&self.object_path(key))
            .await
            .map_err(|e| BlobStorageError::from_store(key, e))
    }

    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectSummary>, BlobStorageError> {
        let list_prefix = match prefix {
            Some(p) => self.object_path(p),
            None => self.path.clone(),
        };
        let root = self.path.as_ref().to_string();
        let mut entries = self.object_store.list(Some(&list_prefix));
        let mut summaries = Vec::new();
        while let Some(meta) = entries.next().await {
            let meta = meta.map_err(|e| BlobStorageError::Unavailable(e.to_string()))?;
            let location = meta.location.as_ref();
            let key = location
                .strip_prefix(root.as_str())
                .map(|k| k.trim_start_matches('/'))
                .unwrap_or(location)
                .to_string();
            summaries.push(ObjectSummary {
                key,
                size_bytes: meta.size,
                last_modified: meta.last_modified,
            });
        }
        Ok(summaries)
    }

    /// Native time-limited url from the backend's own signer. Only the s3
    /// backend can sign; local disk has nothing to sign with.
    pub async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<Url, BlobStorageError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(BlobStorageError::PresignedUnsupported("file"))?;
        signer
            .signed_url(reqwest::Method::GET, &self.object_path(key), expires_in)
            .await
            .map_err(|e| BlobStorageError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn disk_storage(dir: &std::path::Path) -> BlobStorage {
        let config = BlobStorageConfig::new(dir.to_str().unwrap());
        BlobStorage::new(config).unwrap()
    }

    fn one_chunk(
        data: &'static str,
    ) -> impl futures::Stream<Item = Result<Bytes, BlobStorageError>> + Unpin {
        Box::pin(stream::once(async move { Ok(Bytes::from(data)) }))
    }

    #[tokio::test]
    async fn test_put_then_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = disk_storage(temp_dir.path());

        let res = storage
            .put("photo.png", one_chunk("hello blob"))
            .await
            .unwrap();
        assert_eq!(res.size_bytes, 10);
        assert_eq!(res.key, "photo.png");

        let bytes = storage.read_bytes("photo.png").await.unwrap();
        assert_eq!(&bytes[..], b"hello blob");

        let stat = storage.stat("photo.png").await.unwrap();
        assert_eq!(stat.size_bytes, 10);
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = disk_storage(temp_dir.path());

        assert!(!storage.exists("nope").await.unwrap());
        storage.put("doc.txt", one_chunk("x")).await.unwrap();
        assert!(storage.exists("doc.txt").await.unwrap());

        storage.delete("doc.txt").await.unwrap();
        assert!(!storage.exists("doc.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_stat_missing_object_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = disk_storage(temp_dir.path());

        let err = storage.stat("missing").await.unwrap_err();
        assert!(matches!(err, BlobStorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_strips_root_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = disk_storage(temp_dir.path());

        storage.put("a.bin", one_chunk("aa")).await.unwrap();
        storage.put("b.bin", one_chunk("bbb")).await.unwrap();

        let mut keys: Vec<String> = storage
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a.bin", "b.bin"]);
    }

    #[tokio::test]
    async fn test_presigned_unsupported_on_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = disk_storage(temp_dir.path());

        let err = storage
            .presigned_get_url("a.bin", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStorageError::PresignedUnsupported(_)));
    }
}
