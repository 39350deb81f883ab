//! OAuth2 client-credentials authentication for Microsoft Graph.

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthType, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use spbridge_common::{Error, Result};
use spbridge_crypto::SecretString;

/// Default Azure AD authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Scope requesting every application permission granted to the client.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Application credentials registered in Azure AD.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret, already decrypted.
    pub client_secret: SecretString,
}

/// Bearer token returned by the identity provider.
#[derive(Debug, Clone)]
pub struct AccessToken {
    secret: SecretString,
    /// Expiry reported by the token endpoint, if any. Informational only:
    /// nothing refreshes the token automatically.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: SecretString::new(secret),
            expires_at,
        }
    }

    /// Borrow the raw token.
    pub fn secret(&self) -> &str {
        self.secret.expose()
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret.expose())
    }

    /// Whether the reported expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Token cache owned by a single source client.
///
/// The token is fetched lazily on first use and reused for the lifetime of
/// the cache. Callers holding a long-lived client must call `invalidate`
/// themselves when the token stops being accepted.
pub struct TokenCache {
    credentials: ClientCredentials,
    authority_host: String,
    http: oauth2::reqwest::Client,
    token: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    /// Create a new, empty token cache.
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn new(credentials: ClientCredentials, authority_host: impl Into<String>) -> Result<Self> {
        // Following redirects on the token endpoint opens the client up to SSRF.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create token HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            authority_host: authority_host.into(),
            http,
            token: RwLock::new(None),
        })
    }

    /// Token endpoint for the configured tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.credentials.tenant_id
        )
    }

    /// Request a new token from the identity provider and cache it.
    ///
    /// # Errors
    /// - Invalid token URL
    /// - Non-success response or transport failure
    pub async fn fetch(&self) -> Result<AccessToken> {
        let token_url = TokenUrl::new(self.token_url())
            .map_err(|e| Error::InvalidConfig(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(self.credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(
                self.credentials.client_secret.expose().to_string(),
            ))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        debug!("Requesting access token for tenant {}", self.credentials.tenant_id);

        let response = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token request failed: {}", e)))?;

        let expires_at = response
            .expires_in()
            .and_then(|ttl| Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        let token = AccessToken::new(response.access_token().secret().clone(), expires_at);
        *self.token.write().await = Some(token.clone());

        info!("Access token obtained successfully");
        Ok(token)
    }

    /// Authenticate and cache the token; `None` on any failure.
    pub async fn get_access_token(&self) -> Option<AccessToken> {
        match self.fetch().await {
            Ok(token) => Some(token),
            Err(e) => {
                error!("Failed to get access token: {}", e);
                None
            }
        }
    }

    /// Cached token, fetching one first if none is cached.
    ///
    /// # Errors
    /// - No token could be obtained
    pub async fn current(&self) -> Result<AccessToken> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        self.get_access_token()
            .await
            .ok_or_else(|| Error::Authentication("No access token available".to_string()))
    }

    /// Whether a token is currently cached.
    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Drop the cached token so the next request authenticates again.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    /// Replace the cached token.
    pub async fn set_token(&self, token: AccessToken) {
        *self.token.write().await = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            tenant_id: "contoso-tenant".to_string(),
            client_id: "app-id".to_string(),
            client_secret: SecretString::new("app-secret"),
        }
    }

    #[test]
    fn test_token_url() {
        let cache = TokenCache::new(credentials(), DEFAULT_AUTHORITY_HOST).unwrap();
        assert_eq!(
            cache.token_url(),
            "https://login.microsoftonline.com/contoso-tenant/oauth2/v2.0/token"
        );

        let cache = TokenCache::new(credentials(), "http://localhost:9000/").unwrap();
        assert_eq!(
            cache.token_url(),
            "http://localhost:9000/contoso-tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_access_token_expiry() {
        let expired = AccessToken::new("t", Some(Utc::now() - Duration::minutes(1)));
        assert!(expired.is_expired());

        let valid = AccessToken::new("t", Some(Utc::now() + Duration::hours(1)));
        assert!(!valid.is_expired());

        assert!(!AccessToken::new("t", None).is_expired());
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(AccessToken::new("abc", None).bearer(), "Bearer abc");
    }

    #[tokio::test]
    async fn test_cached_token_is_reused_until_invalidated() {
        let cache = TokenCache::new(credentials(), DEFAULT_AUTHORITY_HOST).unwrap();
        assert!(!cache.has_token().await);

        cache.set_token(AccessToken::new("cached", None)).await;
        assert_eq!(cache.current().await.unwrap().secret(), "cached");

        cache.invalidate().await;
        assert!(!cache.has_token().await);
    }

    #[tokio::test]
    async fn test_unreachable_authority_yields_none() {
        // Port 9 (discard) on localhost refuses connections.
        let cache = TokenCache::new(credentials(), "http://127.0.0.1:9").unwrap();
        assert!(cache.get_access_token().await.is_none());
        assert!(matches!(cache.current().await, Err(Error::Authentication(_))));
    }
}
