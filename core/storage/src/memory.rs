//! In-memory source and destination for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use spbridge_common::{Error, FolderPath, ObjectMetadata, RemoteFile, Result};

use crate::provider::{DestinationStore, SourceDirectory};

/// How a health check of an in-memory endpoint behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    Pass,
    Fail,
    /// The check itself errors out.
    Error,
}

fn run_health_check(check: HealthCheck, endpoint: &str) -> Result<bool> {
    match check {
        HealthCheck::Pass => Ok(true),
        HealthCheck::Fail => Ok(false),
        HealthCheck::Error => Err(Error::Network(format!("{} health check errored", endpoint))),
    }
}

#[derive(Debug, Clone)]
struct SourceEntry {
    folder: FolderPath,
    file: RemoteFile,
    content: Option<Vec<u8>>,
}

/// In-memory document library.
///
/// Files are listed in insertion order. Downloads of files registered
/// without content fail, which makes per-file failures easy to stage.
pub struct MemorySource {
    entries: RwLock<Vec<SourceEntry>>,
    listing_error: RwLock<Option<String>>,
    health: RwLock<HealthCheck>,
    downloads: RwLock<Vec<String>>,
}

impl MemorySource {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            listing_error: RwLock::new(None),
            health: RwLock::new(HealthCheck::Pass),
            downloads: RwLock::new(Vec::new()),
        }
    }

    /// Add a downloadable file to a folder. The file id is `"<folder>/<name>"`.
    pub async fn add_file(&self, folder: &FolderPath, name: &str, content: Vec<u8>) -> RemoteFile {
        self.insert(folder, name, Some(content)).await
    }

    /// Add a file that is listed but whose download fails.
    pub async fn add_broken_file(&self, folder: &FolderPath, name: &str) -> RemoteFile {
        self.insert(folder, name, None).await
    }

    async fn insert(
        &self,
        folder: &FolderPath,
        name: &str,
        content: Option<Vec<u8>>,
    ) -> RemoteFile {
        let file = RemoteFile {
            id: format!("{}/{}", folder.relative(), name),
            name: name.to_string(),
            size: content.as_ref().map_or(0, |c| c.len() as u64),
            last_modified: Some("2024-01-01T00:00:00Z".to_string()),
            web_url: None,
        };

        self.entries.write().await.push(SourceEntry {
            folder: folder.clone(),
            file: file.clone(),
            content,
        });
        file
    }

    /// Make every listing call fail with the given message.
    pub async fn fail_listing(&self, message: impl Into<String>) {
        *self.listing_error.write().await = Some(message.into());
    }

    /// Set the outcome of `test_connection`.
    pub async fn set_health(&self, check: HealthCheck) {
        *self.health.write().await = check;
    }

    /// File ids passed to `download`, in call order.
    pub async fn downloads(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceDirectory for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_files(&self, folder: &FolderPath) -> Result<Vec<RemoteFile>> {
        if let Some(message) = self.listing_error.read().await.as_ref() {
            return Err(Error::Network(message.clone()));
        }

        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| &entry.folder == folder)
            .map(|entry| entry.file.clone())
            .collect())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.downloads.write().await.push(file_id.to_string());

        let entries = self.entries.read().await;
        let entry = entries
            .iter()
            .find(|entry| entry.file.id == file_id)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", file_id)))?;

        entry
            .content
            .clone()
            .ok_or_else(|| Error::Network(format!("Download failed: {}", file_id)))
    }

    async fn test_connection(&self) -> Result<bool> {
        run_health_check(*self.health.read().await, "memory source")
    }
}

/// Object stored in a `MemoryStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// In-memory object store.
pub struct MemoryStore {
    containers: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    failing_keys: RwLock<HashSet<String>>,
    listing_error: RwLock<Option<String>>,
    health: RwLock<HealthCheck>,
    ensure_calls: RwLock<usize>,
}

impl MemoryStore {
    /// Create a new store without containers.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            listing_error: RwLock::new(None),
            health: RwLock::new(HealthCheck::Pass),
            ensure_calls: RwLock::new(0),
        }
    }

    /// Make writes to `key` fail.
    pub async fn fail_uploads_to(&self, key: impl Into<String>) {
        self.failing_keys.write().await.insert(key.into());
    }

    /// Make every listing call fail with the given message.
    pub async fn fail_listing(&self, message: impl Into<String>) {
        *self.listing_error.write().await = Some(message.into());
    }

    /// Set the outcome of `test_connection`.
    pub async fn set_health(&self, check: HealthCheck) {
        *self.health.write().await = check;
    }

    /// Check if a container exists.
    pub async fn has_container(&self, container: &str) -> bool {
        self.containers.read().await.contains_key(container)
    }

    /// Get a stored object.
    pub async fn object(&self, container: &str, key: &str) -> Option<StoredObject> {
        self.containers
            .read()
            .await
            .get(container)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Number of `ensure_container_exists` calls so far.
    pub async fn ensure_calls(&self) -> usize {
        *self.ensure_calls.read().await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_container_exists(&self, container: &str) -> Result<()> {
        *self.ensure_calls.write().await += 1;
        self.containers
            .write()
            .await
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn upload_with_metadata(
        &self,
        container: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        self.ensure_container_exists(container).await?;

        if self.failing_keys.read().await.contains(key) {
            return Err(Error::Storage(format!("Upload rejected: {}", key)));
        }

        let object = StoredObject {
            data,
            metadata: metadata.clone(),
        };
        self.containers
            .write()
            .await
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), object);
        Ok(())
    }

    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        if let Some(message) = self.listing_error.read().await.as_ref() {
            return Err(Error::Network(message.clone()));
        }

        self.containers
            .read()
            .await
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| Error::NotFound(format!("Container not found: {}", container)))
    }

    async fn test_connection(&self) -> Result<bool> {
        run_health_check(*self.health.read().await, "memory store")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_lists_files_of_folder_in_order() {
        let source = MemorySource::new();
        let root = FolderPath::root();
        let docs = FolderPath::parse("Docs").unwrap();

        source.add_file(&root, "b.txt", b"b".to_vec()).await;
        source.add_file(&docs, "nested.txt", b"n".to_vec()).await;
        source.add_file(&root, "a.txt", b"a".to_vec()).await;

        let names: Vec<String> = source
            .list_files(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
        assert_eq!(source.list_files(&docs).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_source_broken_download() {
        let source = MemorySource::new();
        let file = source.add_broken_file(&FolderPath::root(), "bad.bin").await;

        assert!(source.download(&file.id).await.is_err());
        assert!(source.download("missing").await.unwrap_err().is_not_found());
        assert_eq!(source.downloads().await, vec![file.id, "missing".to_string()]);
    }

    #[tokio::test]
    async fn test_store_upload_creates_container_and_overwrites() {
        let store = MemoryStore::new();
        let mut metadata = ObjectMetadata::new();
        metadata.insert("source", "sharepoint");

        store
            .upload_with_metadata("c", "k", b"v1".to_vec(), &metadata)
            .await
            .unwrap();
        store
            .upload_with_metadata("c", "k", b"v2".to_vec(), &metadata)
            .await
            .unwrap();

        assert!(store.has_container("c").await);
        assert_eq!(store.ensure_calls().await, 2);
        let object = store.object("c", "k").await.unwrap();
        assert_eq!(object.data, b"v2");
        assert_eq!(object.metadata.get("source"), Some("sharepoint"));
    }

    #[tokio::test]
    async fn test_store_listing() {
        let store = MemoryStore::new();
        assert!(store.list_objects("c").await.is_err());

        store.ensure_container_exists("c").await.unwrap();
        assert!(store.list_objects("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_checks() {
        let store = MemoryStore::new();
        assert!(store.test_connection().await.unwrap());
        store.set_health(HealthCheck::Fail).await;
        assert!(!store.test_connection().await.unwrap());
        store.set_health(HealthCheck::Error).await;
        assert!(store.test_connection().await.is_err());
    }
}
