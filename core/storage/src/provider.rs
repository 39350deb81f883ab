//! Capability traits for the transfer endpoints.

use async_trait::async_trait;

use spbridge_common::{FolderPath, ObjectMetadata, RemoteFile, Result};

/// Document library that files are copied from.
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    /// Get the source name (e.g., "sharepoint", "memory").
    fn name(&self) -> &str;

    /// List the files directly inside a folder.
    ///
    /// # Postconditions
    /// - Folders are never returned, only file entries
    /// - Entries keep the order reported by the source
    async fn list_files(&self, folder: &FolderPath) -> Result<Vec<RemoteFile>>;

    /// Download the full content of a file by its source identifier.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Check that the source is reachable and accepts our credentials.
    ///
    /// `Ok(false)` is a failed check; `Err` means the check itself could not run.
    async fn test_connection(&self) -> Result<bool>;
}

/// Object store that files are copied into.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Get the store name (e.g., "azure_blob", "memory").
    fn name(&self) -> &str;

    /// Create the container if it does not exist yet.
    ///
    /// Idempotent and safe to race with other writers targeting the same
    /// container.
    ///
    /// # Errors
    /// - Any failure other than "container not found" while checking
    /// - Creation failures other than "already exists"
    async fn ensure_container_exists(&self, container: &str) -> Result<()>;

    /// Write an object with attached metadata.
    ///
    /// # Postconditions
    /// - The container exists (checked before every write)
    /// - Any existing object under `key` is overwritten
    async fn upload_with_metadata(
        &self,
        container: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()>;

    /// List object names in a container.
    async fn list_objects(&self, container: &str) -> Result<Vec<String>>;

    /// Check that the account is reachable with a lightweight listing call.
    ///
    /// `Ok(false)` is a failed check; `Err` means the check itself could not run.
    async fn test_connection(&self) -> Result<bool>;
}
