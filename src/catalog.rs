use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::http_objects::FileRecord;

/// In-memory index of uploaded files, keyed by object key. File records are
/// upload glue, not the secure link source of truth; losing them on restart
/// only empties the gallery.
#[derive(Default)]
pub struct FileCatalog {
    files: RwLock<HashMap<String, FileRecord>>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: FileRecord) {
        self.files
            .write()
            .await
            .insert(record.key.clone(), record);
    }

    pub async fn get(&self, key: &str) -> Option<FileRecord> {
        self.files.read().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.files.write().await.remove(key).is_some()
    }

    /// Newest uploads first.
    pub async fn list(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.files.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        records
    }
}
