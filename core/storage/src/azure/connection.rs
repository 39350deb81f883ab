//! Azure Storage connection string parsing.

use std::collections::HashMap;
use std::fmt;

use spbridge_common::{Error, Result};
use spbridge_crypto::SecretString;

/// Well-known account name of the storage emulator.
pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
/// Well-known, public account key of the storage emulator.
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
/// Blob endpoint of the storage emulator.
pub const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// How requests to the blob endpoint are authorized.
#[derive(Clone)]
pub enum BlobCredential {
    /// Account name and base64 account key, used for Shared Key signing.
    SharedKey {
        account: String,
        key: SecretString,
    },
    /// Shared access signature query string, without the leading `?`.
    Sas(SecretString),
}

impl fmt::Debug for BlobCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobCredential::SharedKey { account, .. } => {
                write!(f, "SharedKey {{ account: {}, key: [REDACTED] }}", account)
            }
            BlobCredential::Sas(_) => write!(f, "Sas([REDACTED])"),
        }
    }
}

/// Parsed storage connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    /// Blob service endpoint without trailing slash.
    pub blob_endpoint: String,
    /// Request authorization.
    pub credential: BlobCredential,
}

impl ConnectionString {
    /// Parse a `Key=Value;Key=Value` connection string.
    ///
    /// Supported keys (case-insensitive): `DefaultEndpointsProtocol`,
    /// `AccountName`, `AccountKey`, `EndpointSuffix`, `BlobEndpoint`,
    /// `SharedAccessSignature` and `UseDevelopmentStorage`.
    ///
    /// # Errors
    /// - Segment without `=`
    /// - No blob endpoint can be derived
    /// - Neither an account key nor a SAS is present
    pub fn parse(input: &str) -> Result<Self> {
        let mut fields: HashMap<String, String> = HashMap::new();

        for segment in input.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                Error::InvalidConfig("Malformed connection string segment".to_string())
            })?;
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let dev_storage = fields
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if dev_storage {
            return Ok(Self {
                blob_endpoint: DEV_BLOB_ENDPOINT.to_string(),
                credential: BlobCredential::SharedKey {
                    account: DEV_ACCOUNT_NAME.to_string(),
                    key: SecretString::new(DEV_ACCOUNT_KEY),
                },
            });
        }

        let account = fields.get("accountname").filter(|v| !v.is_empty()).cloned();

        let blob_endpoint = match (fields.get("blobendpoint"), &account) {
            (Some(endpoint), _) if !endpoint.is_empty() => {
                endpoint.trim_end_matches('/').to_string()
            }
            (_, Some(account)) => {
                let protocol = fields
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL);
                let suffix = fields
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{}://{}.blob.{}", protocol, account, suffix)
            }
            _ => {
                return Err(Error::InvalidConfig(
                    "Connection string has neither AccountName nor BlobEndpoint".to_string(),
                ))
            }
        };

        let credential = match (fields.get("accountkey"), fields.get("sharedaccesssignature")) {
            (Some(key), _) if !key.is_empty() => {
                let account = account.ok_or_else(|| {
                    Error::InvalidConfig("AccountKey requires AccountName".to_string())
                })?;
                BlobCredential::SharedKey {
                    account,
                    key: SecretString::new(key.as_str()),
                }
            }
            (_, Some(sas)) if !sas.is_empty() => {
                BlobCredential::Sas(SecretString::new(sas.trim_start_matches('?')))
            }
            _ => {
                return Err(Error::InvalidConfig(
                    "Connection string has neither AccountKey nor SharedAccessSignature"
                        .to_string(),
                ))
            }
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }
}
