//! Transfer coordinator that copies library files into a blob container.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use spbridge_common::{Error, FolderPath, ObjectMetadata, RemoteFile, Result};
use spbridge_crypto::SecretResolver;
use spbridge_storage::{
    BlobClient, DestinationStore, SharePointClient, SharePointConfig, SourceDirectory,
};

use crate::config::{TransferConfig, TransferOptions};
use crate::outcome::{ConnectionReport, TransferOutcome};

/// Value of the `source` metadata entry on every copied object.
pub const SOURCE_TAG: &str = "sharepoint";

/// Why a single listed file was not copied.
#[derive(Debug, thiserror::Error)]
pub enum ItemFailure {
    #[error("download failed: {0}")]
    Download(Error),

    #[error("downloaded file has no content")]
    EmptyContent,

    #[error("upload failed: {0}")]
    Upload(Error),
}

/// Copies the files of a SharePoint folder into an Azure Blob container.
///
/// Files are processed one at a time in listing order. A failing file is
/// recorded by name and never aborts the rest of the batch.
pub struct TransferCoordinator {
    source: Arc<dyn SourceDirectory>,
    store: Arc<dyn DestinationStore>,
    container: String,
    options: TransferOptions,
}

impl TransferCoordinator {
    /// Build a coordinator from a validated configuration.
    ///
    /// Both secrets are decrypted here; no network traffic happens until the
    /// first operation.
    ///
    /// # Errors
    /// - `MissingConfig` naming every absent required field
    /// - Secret resolution failed
    /// - A client could not be constructed (e.g. malformed connection string)
    pub fn new(config: TransferConfig, resolver: &dyn SecretResolver) -> Result<Self> {
        config.validate().inspect_err(|e| {
            error!("Configuration rejected: {}", e);
        })?;

        let client_secret = resolver.decrypt(&config.client_secret).inspect_err(|e| {
            error!("Failed to decrypt client secret: {}", e);
        })?;
        let connection_string = resolver.decrypt(&config.connection_string).inspect_err(|e| {
            error!("Failed to decrypt connection string: {}", e);
        })?;

        let timeout = Duration::from_secs(config.options.request_timeout_secs);

        let mut sharepoint = SharePointConfig::new(
            config.tenant_id,
            config.client_id,
            client_secret,
            config.sharepoint_site_url,
        );
        sharepoint.graph_base_url = config.options.graph_base_url.clone();
        sharepoint.authority_host = config.options.authority_host.clone();
        sharepoint.request_timeout = timeout;

        let source = SharePointClient::new(sharepoint).inspect_err(|e| {
            error!("Failed to initialize SharePoint client: {}", e);
        })?;
        let store = BlobClient::from_connection_string(connection_string.expose(), timeout)
            .inspect_err(|e| {
                error!("Failed to initialize Azure Blob client: {}", e);
            })?;

        info!("File transfer service initialized");

        Ok(Self::from_parts(
            Arc::new(source),
            Arc::new(store),
            config.blob_container,
            config.options,
        ))
    }

    /// Wire a coordinator from already constructed endpoints.
    pub fn from_parts(
        source: Arc<dyn SourceDirectory>,
        store: Arc<dyn DestinationStore>,
        container: impl Into<String>,
        options: TransferOptions,
    ) -> Self {
        Self {
            source,
            store,
            container: container.into(),
            options,
        }
    }

    /// Destination container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Object key a file named `name` is written under.
    pub fn object_key(&self, name: &str) -> String {
        let prefix = self.options.object_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// Copy every file directly inside `folder`.
    ///
    /// Never fails: problems are reported through the outcome.
    pub async fn transfer(&self, folder: &FolderPath) -> TransferOutcome {
        info!(
            "Starting transfer from {} ({}) to container {} ({})",
            folder,
            self.source.name(),
            self.container,
            self.store.name()
        );

        let files = match self.source.list_files(folder).await {
            Ok(files) => files,
            Err(e) => {
                error!("Transfer failed: {}", e);
                return TransferOutcome::failed(e);
            }
        };

        if files.is_empty() {
            info!("No files found in {}", folder);
            return TransferOutcome::no_files();
        }

        let mut transferred = 0;
        let mut failed_files = Vec::new();

        for file in &files {
            match self.transfer_file(file).await {
                Ok(key) => {
                    transferred += 1;
                    info!("File transferred successfully: {} -> {}", file.name, key);
                }
                Err(e) => {
                    warn!("Failed to transfer {}: {}", file.name, e);
                    failed_files.push(file.name.clone());
                }
            }
        }

        let outcome = TransferOutcome::completed(transferred, failed_files);
        info!("{}", outcome.message);
        outcome
    }

    /// Like `transfer`, taking the folder as a string (`"/"` for the root).
    pub async fn transfer_path(&self, folder: &str) -> TransferOutcome {
        match FolderPath::parse(folder) {
            Ok(folder) => self.transfer(&folder).await,
            Err(e) => {
                error!("Transfer failed: {}", e);
                TransferOutcome::failed(e)
            }
        }
    }

    async fn transfer_file(&self, file: &RemoteFile) -> std::result::Result<String, ItemFailure> {
        debug!("Downloading {} ({})", file.name, file.id);

        let data = self
            .source
            .download(&file.id)
            .await
            .map_err(ItemFailure::Download)?;
        if data.is_empty() {
            return Err(ItemFailure::EmptyContent);
        }

        let metadata = ObjectMetadata::for_transfer(
            file,
            SOURCE_TAG,
            &self.options.service_tag,
            data.len(),
            Utc::now(),
        );
        let key = self.object_key(&file.name);

        self.store
            .upload_with_metadata(&self.container, &key, data, &metadata)
            .await
            .map_err(ItemFailure::Upload)?;
        Ok(key)
    }

    /// Object names in the destination container; empty if listing fails.
    pub async fn list_destination_files(&self) -> Vec<String> {
        match self.store.list_objects(&self.container).await {
            Ok(names) => names,
            Err(e) => {
                error!("Error listing destination files: {}", e);
                Vec::new()
            }
        }
    }

    /// Probe both endpoints.
    pub async fn test_connection(&self) -> ConnectionReport {
        let sharepoint = match self.source.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Connection test failed: {}", e);
                return ConnectionReport::errored(e);
            }
        };
        let azure_blob = match self.store.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Connection test failed: {}", e);
                return ConnectionReport::errored(e);
            }
        };

        let report = ConnectionReport::checked(sharepoint, azure_blob);
        info!(
            "Connection test: sharepoint={}, azure_blob={}",
            report.sharepoint, report.azure_blob
        );
        report
    }
}
