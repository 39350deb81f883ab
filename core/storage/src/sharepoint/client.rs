//! Microsoft Graph client for SharePoint document libraries.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use spbridge_common::{Error, FolderPath, RemoteFile, Result};
use spbridge_crypto::SecretString;

use super::auth::{AccessToken, ClientCredentials, TokenCache, DEFAULT_AUTHORITY_HOST};
use crate::provider::SourceDirectory;

/// Microsoft Graph API base URL.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Path segment that precedes the site identifier in a site URL.
const SITE_MARKER: &str = "sites";

/// Characters escaped inside a single Graph path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Extract the site identifier from a SharePoint site URL.
///
/// Splits the URL on `/`, finds the first segment equal to `sites` and
/// returns the segment after it. `https://contoso.sharepoint.com/sites/hr`
/// yields `hr`. Returns `None` when the marker is missing or nothing follows it.
pub fn extract_site_id(site_url: &str) -> Option<&str> {
    let mut parts = site_url.split('/');
    parts.by_ref().find(|part| *part == SITE_MARKER)?;
    parts.next().filter(|site| !site.is_empty())
}

/// Listing URL for the children of a folder.
///
/// The root folder and nested folders use different request shapes:
/// `drive/root/children` versus `drive/root:/{path}:/children`.
pub fn children_url(graph_base: &str, site_id: &str, folder: &FolderPath) -> String {
    let base = graph_base.trim_end_matches('/');
    if folder.is_root() {
        format!("{}/sites/{}/drive/root/children", base, site_id)
    } else {
        let encoded: Vec<String> = folder
            .components()
            .iter()
            .map(|c| utf8_percent_encode(c, PATH_SEGMENT).to_string())
            .collect();
        format!(
            "{}/sites/{}/drive/root:/{}:/children",
            base,
            site_id,
            encoded.join("/")
        )
    }
}

/// Content URL for a drive item.
pub fn content_url(graph_base: &str, site_id: &str, item_id: &str) -> String {
    format!(
        "{}/sites/{}/drive/items/{}/content",
        graph_base.trim_end_matches('/'),
        site_id,
        utf8_percent_encode(item_id, PATH_SEGMENT)
    )
}

/// Drive item as returned by the Graph listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    /// File facet; present only on files.
    #[serde(default)]
    pub file: Option<serde_json::Value>,
    /// Folder facet; present only on folders.
    #[serde(default)]
    pub folder: Option<serde_json::Value>,
}

impl DriveItem {
    /// Check if this item is a file.
    pub fn is_file(&self) -> bool {
        self.file.as_ref().is_some_and(|facet| !facet.is_null())
    }

    fn into_remote_file(self) -> RemoteFile {
        RemoteFile {
            id: self.id,
            name: self.name,
            size: self.size.unwrap_or(0),
            last_modified: self.last_modified_date_time,
            web_url: self.web_url,
        }
    }
}

/// One page of a children listing.
#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

impl ChildrenPage {
    /// Split the page into its file entries and the next page link.
    fn into_files(self) -> (Vec<RemoteFile>, Option<String>) {
        let files = self
            .value
            .into_iter()
            .filter(DriveItem::is_file)
            .map(DriveItem::into_remote_file)
            .collect();
        (files, self.next_link)
    }
}

/// Configuration for the SharePoint source.
#[derive(Debug, Clone)]
pub struct SharePointConfig {
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Decrypted client secret.
    pub client_secret: SecretString,
    /// Site URL, e.g. `https://contoso.sharepoint.com/sites/finance`.
    pub site_url: String,
    /// Graph API base URL.
    pub graph_base_url: String,
    /// Identity provider host.
    pub authority_host: String,
    /// Per-request timeout of the HTTP client.
    pub request_timeout: Duration,
}

impl SharePointConfig {
    /// Configuration with the public Graph and Azure AD endpoints.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            site_url: site_url.into(),
            graph_base_url: GRAPH_API_BASE.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// SharePoint source backed by Microsoft Graph.
pub struct SharePointClient {
    http: Client,
    tokens: TokenCache,
    site_url: String,
    graph_base: String,
}

impl SharePointClient {
    /// Create a new SharePoint client.
    ///
    /// No network traffic happens here; the token is fetched on first use.
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn new(config: SharePointConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("spbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = ClientCredentials {
            tenant_id: config.tenant_id,
            client_id: config.client_id,
            client_secret: config.client_secret,
        };
        let tokens = TokenCache::new(credentials, config.authority_host)?;

        info!("SharePoint Graph API client initialized for site: {}", config.site_url);

        Ok(Self {
            http,
            tokens,
            site_url: config.site_url,
            graph_base: config.graph_base_url,
        })
    }

    /// Authenticate against the identity provider and cache the token.
    pub async fn get_access_token(&self) -> Option<AccessToken> {
        self.tokens.get_access_token().await
    }

    /// Drop the cached token; the next request authenticates again.
    pub async fn invalidate_token(&self) {
        self.tokens.invalidate().await;
    }

    fn site_id(&self) -> Result<&str> {
        extract_site_id(&self.site_url).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Could not extract site ID from URL: {}",
                self.site_url
            ))
        })
    }

    /// List the files of a folder, following pagination.
    ///
    /// # Errors
    /// - No token could be obtained
    /// - Site URL carries no site identifier
    /// - Non-success response or transport failure
    pub async fn try_list_files(&self, folder: &FolderPath) -> Result<Vec<RemoteFile>> {
        let token = self.tokens.current().await?;
        let site_id = self.site_id()?;

        let mut files = Vec::new();
        let mut next = Some(children_url(&self.graph_base, site_id, folder));

        while let Some(url) = next.take() {
            debug!("Listing {}", url);

            let response = self
                .http
                .get(&url)
                .header(header::AUTHORIZATION, token.bearer())
                .header(header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| Error::Network(format!("Failed to list files: {}", e)))?;

            let page: ChildrenPage = self.handle_response(response).await?;
            let (page_files, next_link) = page.into_files();
            files.extend(page_files);
            next = next_link;
        }

        Ok(files)
    }

    /// Download the content of a drive item.
    ///
    /// # Errors
    /// - No token could be obtained
    /// - Site URL carries no site identifier
    /// - Non-success response or transport failure
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.tokens.current().await?;
        let site_id = self.site_id()?;
        let url = content_url(&self.graph_base, site_id, file_id);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, token.bearer())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download file: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(status_error(status, response).await);
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read download response: {}", e)))?;

        info!("File downloaded successfully, size: {} bytes", data.len());
        Ok(data.to_vec())
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
        } else {
            Err(status_error(status, response).await)
        }
    }
}

/// Map a non-success Graph response to an error.
async fn status_error(status: StatusCode, response: reqwest::Response) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound("Resource not found".to_string()),
        StatusCode::UNAUTHORIZED => Error::Authentication("Invalid or expired token".to_string()),
        StatusCode::FORBIDDEN => Error::PermissionDenied("Access denied".to_string()),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Error::Network(format!("API error: {} - {}", status, body))
        }
    }
}

#[async_trait]
impl SourceDirectory for SharePointClient {
    fn name(&self) -> &str {
        "sharepoint"
    }

    /// Listing failures are logged and reported as an empty folder.
    async fn list_files(&self, folder: &FolderPath) -> Result<Vec<RemoteFile>> {
        match self.try_list_files(folder).await {
            Ok(files) => {
                info!("Found {} files in SharePoint", files.len());
                Ok(files)
            }
            Err(e) => {
                error!("Error listing files in {}: {}", folder, e);
                Ok(Vec::new())
            }
        }
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.download_file(file_id).await
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(self.get_access_token().await.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(site_url: &str) -> SharePointConfig {
        let mut config = SharePointConfig::new(
            "tenant",
            "client",
            SecretString::new("secret"),
            site_url,
        );
        // Nothing listens on the discard port, so every request fails fast.
        config.authority_host = "http://127.0.0.1:9".to_string();
        config.graph_base_url = "http://127.0.0.1:9/v1.0".to_string();
        config
    }

    #[test]
    fn test_extract_site_id() {
        assert_eq!(
            extract_site_id("https://contoso.sharepoint.com/sites/finance"),
            Some("finance")
        );
        assert_eq!(
            extract_site_id("https://contoso.sharepoint.com/sites/finance/Shared%20Documents"),
            Some("finance")
        );
        assert_eq!(extract_site_id("https://contoso.sharepoint.com/teams/finance"), None);
        assert_eq!(extract_site_id("https://contoso.sharepoint.com/sites/"), None);
        assert_eq!(extract_site_id("https://contoso.sharepoint.com/sites"), None);
    }

    #[test]
    fn test_extract_site_id_uses_first_marker() {
        assert_eq!(extract_site_id("https://x/sites/a/sites/b"), Some("a"));
    }

    #[test]
    fn test_children_url_shapes() {
        let root = children_url(GRAPH_API_BASE, "finance", &FolderPath::root());
        assert_eq!(
            root,
            "https://graph.microsoft.com/v1.0/sites/finance/drive/root/children"
        );

        let nested = children_url(
            GRAPH_API_BASE,
            "finance",
            &FolderPath::parse("Docs/2024").unwrap(),
        );
        assert_eq!(
            nested,
            "https://graph.microsoft.com/v1.0/sites/finance/drive/root:/Docs/2024:/children"
        );
    }

    #[test]
    fn test_children_url_escapes_segments() {
        let url = children_url(
            GRAPH_API_BASE,
            "finance",
            &FolderPath::parse("Shared Documents/Q1#2").unwrap(),
        );
        assert!(url.ends_with("/drive/root:/Shared%20Documents/Q1%232:/children"));
    }

    #[test]
    fn test_content_url() {
        assert_eq!(
            content_url("https://graph.microsoft.com/v1.0/", "finance", "01ABC"),
            "https://graph.microsoft.com/v1.0/sites/finance/drive/items/01ABC/content"
        );
    }

    #[test]
    fn test_listing_filters_folders() {
        let json = serde_json::json!({
            "value": [
                {
                    "id": "1",
                    "name": "report.pdf",
                    "size": 2048,
                    "lastModifiedDateTime": "2024-03-01T10:00:00Z",
                    "webUrl": "https://contoso.sharepoint.com/sites/finance/report.pdf",
                    "file": { "mimeType": "application/pdf" }
                },
                {
                    "id": "2",
                    "name": "Archive",
                    "folder": { "childCount": 4 }
                },
                {
                    "id": "3",
                    "name": "notes.txt",
                    "file": { "mimeType": "text/plain" }
                }
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        });

        let page: ChildrenPage = serde_json::from_value(json).unwrap();
        let (files, next) = page.into_files();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "report.pdf");
        assert_eq!(files[0].size, 2048);
        assert_eq!(files[0].last_modified.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(files[1].name, "notes.txt");
        assert_eq!(files[1].size, 0);
        assert_eq!(files[1].last_modified, None);
        assert_eq!(next.as_deref(), Some("https://graph.microsoft.com/v1.0/next"));
    }

    #[test]
    fn test_empty_listing_page() {
        let page: ChildrenPage = serde_json::from_str("{}").unwrap();
        let (files, next) = page.into_files();
        assert!(files.is_empty());
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_listing_without_token_is_empty() {
        let client =
            SharePointClient::new(config("https://contoso.sharepoint.com/sites/finance")).unwrap();

        assert!(client.try_list_files(&FolderPath::root()).await.is_err());
        assert!(client.list_files(&FolderPath::root()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_without_site_id_is_empty() {
        let client =
            SharePointClient::new(config("https://contoso.sharepoint.com/teams/finance")).unwrap();
        client
            .tokens
            .set_token(AccessToken::new("cached", None))
            .await;

        let result = client.try_list_files(&FolderPath::root()).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(client.list_files(&FolderPath::root()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_is_error() {
        let client =
            SharePointClient::new(config("https://contoso.sharepoint.com/sites/finance")).unwrap();
        client
            .tokens
            .set_token(AccessToken::new("cached", None))
            .await;

        assert!(client.download("01ABC").await.is_err());
    }

    #[tokio::test]
    async fn test_connection_fails_without_identity_provider() {
        let client =
            SharePointClient::new(config("https://contoso.sharepoint.com/sites/finance")).unwrap();
        assert!(!client.test_connection().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_token() {
        let client =
            SharePointClient::new(config("https://contoso.sharepoint.com/sites/finance")).unwrap();
        client
            .tokens
            .set_token(AccessToken::new("cached", None))
            .await;

        client.invalidate_token().await;
        assert!(!client.tokens.has_token().await);
    }

    proptest! {
        #[test]
        fn site_id_follows_marker(host in "[a-z]{1,10}", site in "[A-Za-z0-9-]{1,16}", rest in "(/[a-z]{1,8}){0,3}") {
            let url = format!("https://{}.sharepoint.com/sites/{}{}", host, site, rest);
            prop_assert_eq!(extract_site_id(&url), Some(site.as_str()));
        }
    }
}
