//! Common types used throughout spbridge.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A folder inside the source document library.
///
/// The root folder and nested folders are addressed differently by the
/// source API, so the distinction is kept explicit instead of being
/// re-derived from strings at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderPath {
    components: Vec<String>,
}

impl FolderPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a folder path string.
    ///
    /// Uses '/' as separator. `""` and `"/"` both denote the root; leading
    /// and trailing separators are ignored.
    ///
    /// # Errors
    /// - Returns error if the path contains an empty component (`"a//b"`)
    pub fn parse(path: &str) -> crate::Result<Self> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut components = Vec::new();
        for comp in trimmed.split('/') {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(format!(
                    "Folder path contains an empty component: {}",
                    path
                )));
            }
            components.push(comp.to_string());
        }
        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Path relative to the library root, without leading separator
    /// (`"Docs/2024"`). Empty for the root.
    pub fn relative(&self) -> String {
        self.components.join("/")
    }
}

impl Default for FolderPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.relative())
    }
}

/// Listing snapshot of one file in the source library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Source-side item identifier, used for downloads.
    pub id: String,
    /// File name.
    pub name: String,
    /// Size in bytes as reported by the listing.
    pub size: u64,
    /// Last modification time, verbatim from the source.
    pub last_modified: Option<String>,
    /// Browser URL of the file.
    pub web_url: Option<String>,
}

/// Key/value metadata attached to a written object.
///
/// Keys are kept sorted so the wire order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectMetadata(BTreeMap<String, String>);

impl ObjectMetadata {
    pub const SOURCE: &'static str = "source";
    pub const ORIGINAL_NAME: &'static str = "original_name";
    pub const UPLOAD_TIME: &'static str = "upload_time";
    pub const FILE_SIZE: &'static str = "file_size";
    pub const TRANSFER_SERVICE: &'static str = "transfer_service";
    pub const SOURCE_MODIFIED_TIME: &'static str = "sharepoint_modified_time";

    /// Create an empty metadata map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Provenance metadata for a file copied from the source library.
    ///
    /// `file_size` is the length of the downloaded payload, not the size
    /// reported by the listing.
    pub fn for_transfer(
        file: &RemoteFile,
        source_tag: &str,
        service_tag: &str,
        byte_len: usize,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        let mut metadata = Self::new();
        metadata.insert(Self::SOURCE, source_tag);
        metadata.insert(Self::ORIGINAL_NAME, &file.name);
        metadata.insert(
            Self::UPLOAD_TIME,
            uploaded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        metadata.insert(Self::FILE_SIZE, byte_len.to_string());
        metadata.insert(Self::TRANSFER_SERVICE, service_tag);
        metadata.insert(
            Self::SOURCE_MODIFIED_TIME,
            file.last_modified.clone().unwrap_or_default(),
        );
        metadata
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
