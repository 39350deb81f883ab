//! Azure Blob Storage client.
//!
//! Object writes and listings go through an OpenDAL `Azblob` operator per
//! container. Container management and the account probe are account-level
//! calls OpenDAL does not offer, so those are signed REST requests.

use async_trait::async_trait;
use chrono::Utc;
use opendal::services::Azblob;
use opendal::{ErrorKind, Operator};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use reqwest::header;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;

use spbridge_common::{Error, ObjectMetadata, Result};

use super::connection::{BlobCredential, ConnectionString};
use super::signing::SharedKeySigner;
use crate::provider::DestinationStore;

/// REST API version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// Characters escaped in a container path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped in metadata values; everything else must stay a
/// visible ASCII header value.
const METADATA_VALUE: &AsciiSet = &CONTROLS.add(b'%');

/// URL of a container resource (`?restype=container` not included).
pub fn container_url(endpoint: &str, container: &str) -> Result<Url> {
    let raw = format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        utf8_percent_encode(container, PATH_SEGMENT)
    );
    Url::parse(&raw)
        .map_err(|e| Error::InvalidInput(format!("Invalid container URL {}: {}", raw, e)))
}

/// Metadata value made safe for an `x-ms-meta-*` header.
pub fn metadata_value(value: &str) -> String {
    utf8_percent_encode(value, METADATA_VALUE).to_string()
}

/// Request authorization prepared from the connection string.
enum Authorizer {
    SharedKey(SharedKeySigner),
    Sas(String),
}

/// Azure Blob Storage client.
pub struct BlobClient {
    http: Client,
    connection: ConnectionString,
    authorizer: Authorizer,
    operators: RwLock<HashMap<String, Operator>>,
}

impl BlobClient {
    /// Create a client from a parsed connection string.
    ///
    /// # Errors
    /// - Invalid account key
    /// - HTTP client construction failed
    pub fn new(connection: ConnectionString, request_timeout: Duration) -> Result<Self> {
        let authorizer = match &connection.credential {
            BlobCredential::SharedKey { account, key } => {
                Authorizer::SharedKey(SharedKeySigner::new(account.clone(), key.expose())?)
            }
            BlobCredential::Sas(sas) => Authorizer::Sas(sas.expose().to_string()),
        };

        let http = Client::builder()
            .user_agent(concat!("spbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Azure Blob Storage client initialized for {}",
            connection.blob_endpoint
        );

        Ok(Self {
            http,
            connection,
            authorizer,
            operators: RwLock::new(HashMap::new()),
        })
    }

    /// Create a client from a raw connection string.
    pub fn from_connection_string(connection: &str, request_timeout: Duration) -> Result<Self> {
        Self::new(ConnectionString::parse(connection)?, request_timeout)
    }

    /// Blob service endpoint.
    pub fn endpoint(&self) -> &str {
        &self.connection.blob_endpoint
    }

    /// OpenDAL operator rooted at a container, built on first use.
    pub async fn operator(&self, container: &str) -> Result<Operator> {
        if let Some(op) = self.operators.read().await.get(container) {
            return Ok(op.clone());
        }

        let builder = Azblob::default()
            .root("/")
            .container(container)
            .endpoint(&self.connection.blob_endpoint);
        let builder = match &self.connection.credential {
            BlobCredential::SharedKey { account, key } => {
                builder.account_name(account).account_key(key.expose())
            }
            BlobCredential::Sas(sas) => builder.sas_token(sas.expose()),
        };

        let op = Operator::new(builder)
            .map_err(|e| map_opendal_error(e, container))?
            .finish();

        self.operators
            .write()
            .await
            .insert(container.to_string(), op.clone());
        Ok(op)
    }

    /// Add service headers, authorize and send a request.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let mut request = builder
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to build request: {}", e)))?;

        match &self.authorizer {
            Authorizer::SharedKey(signer) => signer.authorize(&mut request)?,
            Authorizer::Sas(sas) => {
                let url = request.url_mut();
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, sas),
                    _ => sas.clone(),
                };
                url.set_query(Some(&query));
            }
        }

        debug!("{} {}", request.method(), request.url().path());

        self.http
            .execute(request)
            .await
            .map_err(|e| Error::Network(format!("Blob request failed: {}", e)))
    }

    fn container_resource(&self, container: &str) -> Result<Url> {
        let mut url = container_url(self.endpoint(), container)?;
        url.query_pairs_mut().append_pair("restype", "container");
        Ok(url)
    }

    /// Check whether a container exists.
    ///
    /// # Errors
    /// - `NotFound` when the container does not exist
    /// - Any other non-success response or transport failure
    pub async fn get_container_properties(&self, container: &str) -> Result<()> {
        let url = self.container_resource(container)?;
        let response = self.send(self.http.request(Method::HEAD, url)).await?;
        expect_success(response, container).await
    }

    /// Create a container.
    ///
    /// # Errors
    /// - `AlreadyExists` when another writer created it first
    /// - Any other non-success response or transport failure
    pub async fn create_container(&self, container: &str) -> Result<()> {
        let url = self.container_resource(container)?;
        let response = self
            .send(self.http.put(url).header(header::CONTENT_LENGTH, "0"))
            .await?;
        expect_success(response, container).await
    }

    /// Write a block blob, overwriting any existing blob with the same name.
    pub async fn put_blob(
        &self,
        container: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        let op = self.operator(container).await?;
        let user_metadata: Vec<(String, String)> = metadata
            .iter()
            .map(|(name, value)| (name.to_string(), metadata_value(value)))
            .collect();

        op.write_with(key, data)
            .content_type("application/octet-stream")
            .user_metadata(user_metadata)
            .await
            .map_err(|e| map_opendal_error(e, key))?;
        Ok(())
    }

    /// List every blob name in a container.
    pub async fn list_blob_names(&self, container: &str) -> Result<Vec<String>> {
        let op = self.operator(container).await?;
        let entries = op
            .list_with("/")
            .recursive(true)
            .await
            .map_err(|e| map_opendal_error(e, container))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata().mode().is_file())
            .map(|entry| entry.path().trim_start_matches('/').to_string())
            .collect())
    }

    /// Account-level `List Containers` call returning at most one entry.
    pub async fn probe_account(&self) -> Result<()> {
        let mut url = Url::parse(&format!("{}/", self.endpoint().trim_end_matches('/')))
            .map_err(|e| Error::InvalidConfig(format!("Invalid blob endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("comp", "list")
            .append_pair("maxresults", "1");

        let response = self.send(self.http.get(url)).await?;
        expect_success(response, "account").await
    }
}

/// Map an OpenDAL error onto the shared error type.
fn map_opendal_error(e: opendal::Error, resource: &str) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("{} not found", resource)),
        ErrorKind::AlreadyExists => Error::AlreadyExists(format!("{} already exists", resource)),
        ErrorKind::PermissionDenied => {
            Error::PermissionDenied(format!("Access to {} denied: {}", resource, e))
        }
        ErrorKind::ConfigInvalid => Error::InvalidConfig(e.to_string()),
        _ => Error::Storage(format!("Blob operation on {} failed: {}", resource, e)),
    }
}

/// Map a Blob service status code to an error.
fn status_error(status: StatusCode, body: &str, resource: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("{} not found", resource)),
        StatusCode::CONFLICT => Error::AlreadyExists(format!("{} already exists", resource)),
        StatusCode::UNAUTHORIZED => {
            Error::Authentication(format!("Request for {} rejected", resource))
        }
        StatusCode::FORBIDDEN => {
            Error::PermissionDenied(format!("Access to {} denied: {}", resource, body))
        }
        _ => Error::Storage(format!(
            "Blob service error for {}: {} - {}",
            resource, status, body
        )),
    }
}

async fn expect_success(response: Response, resource: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, resource))
}

#[async_trait]
impl DestinationStore for BlobClient {
    fn name(&self) -> &str {
        "azure_blob"
    }

    async fn ensure_container_exists(&self, container: &str) -> Result<()> {
        match self.get_container_properties(container).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!("Container {} does not exist, creating...", container);
                match self.create_container(container).await {
                    Ok(()) => {
                        info!("Container {} created successfully", container);
                        Ok(())
                    }
                    // Another writer won the race.
                    Err(Error::AlreadyExists(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn upload_with_metadata(
        &self,
        container: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        self.ensure_container_exists(container).await?;
        self.put_blob(container, key, data, metadata).await?;
        info!("File uploaded successfully to blob: {}", key);
        Ok(())
    }

    /// Listing failures are logged and reported as an empty container.
    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        match self.list_blob_names(container).await {
            Ok(names) => {
                info!("Found {} blobs in container {}", names.len(), container);
                Ok(names)
            }
            Err(e) => {
                error!("Failed to list blobs in container {}: {}", container, e);
                Ok(Vec::new())
            }
        }
    }

    async fn test_connection(&self) -> Result<bool> {
        match self.probe_account().await {
            Ok(()) => {
                info!("Azure Blob Storage connection test successful");
                Ok(true)
            }
            Err(e) => {
                error!("Azure Blob Storage connection test failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::connection::{DEV_ACCOUNT_KEY, DEV_ACCOUNT_NAME};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    fn client_for(endpoint: &str) -> BlobClient {
        let connection = ConnectionString::parse(&format!(
            "BlobEndpoint={};AccountName={};AccountKey={}",
            endpoint, DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY
        ))
        .unwrap();
        BlobClient::new(connection, Duration::from_secs(5)).unwrap()
    }

    fn offline_client() -> BlobClient {
        // Nothing listens on the discard port, so every request fails fast.
        client_for("http://127.0.0.1:9/devstoreaccount1")
    }

    /// Blob endpoint that answers one request per status, in order, and
    /// records each request line.
    async fn scripted_endpoint(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 16 * 1024];
                let n = socket.read(&mut buf).await.unwrap();
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                log.lock()
                    .await
                    .push(head.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/{}", addr, DEV_ACCOUNT_NAME), seen)
    }

    #[test]
    fn test_container_url() {
        let url = container_url("https://acct.blob.core.windows.net/", "backups").unwrap();
        assert_eq!(url.as_str(), "https://acct.blob.core.windows.net/backups");
    }

    #[test]
    fn test_metadata_value_encoding() {
        assert_eq!(metadata_value("résumé 100%.pdf"), "r%C3%A9sum%C3%A9 100%25.pdf");
        assert_eq!(metadata_value("2024-06-01T12:00:00Z"), "2024-06-01T12:00:00Z");
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, "", "c").is_not_found());
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "", "c"),
            Error::AlreadyExists(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", "c"),
            Error::Storage(_)
        ));
    }

    #[tokio::test]
    async fn test_operator_is_rooted_at_container() {
        let client = offline_client();
        let op = client.operator("backups").await.unwrap();

        assert_eq!(op.info().name(), "backups");
        assert_eq!(op.info().root(), "/");

        client.operator("backups").await.unwrap();
        assert_eq!(client.operators.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_creates_missing_container() {
        let (endpoint, seen) = scripted_endpoint(vec![404, 201]).await;
        let client = client_for(&endpoint);

        client.ensure_container_exists("backups").await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("HEAD /devstoreaccount1/backups?restype=container"));
        assert!(seen[1].starts_with("PUT /devstoreaccount1/backups?restype=container"));
    }

    #[tokio::test]
    async fn test_ensure_accepts_concurrent_creation() {
        let (endpoint, seen) = scripted_endpoint(vec![404, 409]).await;
        let client = client_for(&endpoint);

        assert!(client.ensure_container_exists("backups").await.is_ok());
        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_existing_container_is_not_recreated() {
        let (endpoint, seen) = scripted_endpoint(vec![200]).await;
        let client = client_for(&endpoint);

        client.ensure_container_exists("backups").await.unwrap();
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_propagates_other_errors() {
        let (endpoint, seen) = scripted_endpoint(vec![500]).await;
        let client = client_for(&endpoint);

        let result = client.ensure_container_exists("backups").await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_propagates_create_failure() {
        let (endpoint, _seen) = scripted_endpoint(vec![404, 403]).await;
        let client = client_for(&endpoint);

        let result = client.ensure_container_exists("backups").await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_probe_account() {
        let (endpoint, seen) = scripted_endpoint(vec![200]).await;
        let client = client_for(&endpoint);

        assert!(client.test_connection().await.unwrap());
        assert!(seen.lock().await[0].starts_with("GET /devstoreaccount1/?comp=list&maxresults=1"));
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let client = offline_client();
        let metadata = ObjectMetadata::new();

        assert!(client
            .upload_with_metadata("backups", "sharepoint/a.txt", b"a".to_vec(), &metadata)
            .await
            .is_err());
        assert!(client.list_objects("backups").await.unwrap().is_empty());
        assert!(!client.test_connection().await.unwrap());
    }

    #[test]
    fn test_sas_client_construction() {
        let client = BlobClient::from_connection_string(
            "BlobEndpoint=https://acct.blob.core.windows.net;SharedAccessSignature=sv=2022-11-02&sig=abc",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://acct.blob.core.windows.net");
    }
}
