//! Transfer configuration and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use spbridge_common::{Error, Result};

/// Keys every configuration must carry with a non-empty value.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "tenant_id",
    "client_id",
    "client_secret",
    "sharepoint_site_url",
    "connection_string",
    "blob_container",
];

/// Optional tuning knobs; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Namespace segment prepended to every object key.
    pub object_prefix: String,
    /// Value of the `transfer_service` metadata entry.
    pub service_tag: String,
    /// Microsoft Graph API base URL.
    pub graph_base_url: String,
    /// Identity provider host.
    pub authority_host: String,
    /// Per-request timeout of the HTTP clients, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            object_prefix: "sharepoint".to_string(),
            service_tag: "FileTransferService".to_string(),
            graph_base_url: spbridge_storage::sharepoint::client::GRAPH_API_BASE.to_string(),
            authority_host: spbridge_storage::sharepoint::auth::DEFAULT_AUTHORITY_HOST.to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Configuration of one transfer coordinator.
///
/// `client_secret` and `connection_string` hold ciphertext; they are only
/// decrypted when the coordinator is built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Azure AD tenant ID.
    pub tenant_id: String,
    /// Azure AD application (client) ID.
    pub client_id: String,
    /// Encrypted client secret.
    pub client_secret: String,
    /// SharePoint site URL.
    pub sharepoint_site_url: String,
    /// Encrypted storage connection string.
    pub connection_string: String,
    /// Destination container name.
    pub blob_container: String,
    /// Optional settings, given as top-level keys.
    #[serde(flatten)]
    pub options: TransferOptions,
}

impl TransferConfig {
    /// Build a configuration from a string map.
    ///
    /// Unknown keys are ignored. Optional settings take their defaults.
    ///
    /// # Errors
    /// - `MissingConfig` naming every required key that is absent or empty
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        check_required(|key| map.get(key).map(String::as_str))?;

        let field = |key: &str| map.get(key).cloned().unwrap_or_default();
        Ok(Self {
            tenant_id: field("tenant_id"),
            client_id: field("client_id"),
            client_secret: field("client_secret"),
            sharepoint_site_url: field("sharepoint_site_url"),
            connection_string: field("connection_string"),
            blob_container: field("blob_container"),
            options: TransferOptions::default(),
        })
    }

    /// Build a configuration from a JSON object.
    ///
    /// # Errors
    /// - `InvalidConfig` if the document is not an object or has wrongly typed fields
    /// - `MissingConfig` naming every required key that is absent, null or empty
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidConfig("Configuration must be a JSON object".to_string())
        })?;

        check_required(|key| match object.get(key) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            // Present but not a string: reported by deserialization below.
            Some(_) => Some("<non-string>"),
        })?;

        serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(value)
    }

    /// Check that every required field is non-empty.
    pub fn validate(&self) -> Result<()> {
        check_required(|key| match key {
            "tenant_id" => Some(self.tenant_id.as_str()),
            "client_id" => Some(self.client_id.as_str()),
            "client_secret" => Some(self.client_secret.as_str()),
            "sharepoint_site_url" => Some(self.sharepoint_site_url.as_str()),
            "connection_string" => Some(self.connection_string.as_str()),
            "blob_container" => Some(self.blob_container.as_str()),
            _ => None,
        })?;

        if self.options.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fail with every required key whose value is absent or blank.
fn check_required<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Result<()> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|key| lookup(key).map_or(true, |value| value.trim().is_empty()))
        .map(|key| key.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingConfig(missing))
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<encrypted>")
            .field("sharepoint_site_url", &self.sharepoint_site_url)
            .field("connection_string", &"<encrypted>")
            .field("blob_container", &self.blob_container)
            .field("options", &self.options)
            .finish()
    }
}
