//! Reports returned by the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of one `transfer` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// False only when the transfer as a whole could not run.
    pub success: bool,
    pub message: String,
    pub transferred_count: usize,
    /// Names of files that failed, in listing order.
    pub failed_files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransferOutcome {
    /// The listing came back empty.
    pub fn no_files() -> Self {
        Self {
            success: true,
            message: "No files found for transfer".to_string(),
            transferred_count: 0,
            failed_files: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Every listed file was attempted.
    pub fn completed(transferred_count: usize, failed_files: Vec<String>) -> Self {
        Self {
            success: true,
            message: format!(
                "Transfer completed, success: {}, failed: {}",
                transferred_count,
                failed_files.len()
            ),
            transferred_count,
            failed_files,
            timestamp: Utc::now(),
        }
    }

    /// The transfer aborted before attempting files.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Transfer failed: {}", reason),
            transferred_count: 0,
            failed_files: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// True if at least one file could not be copied.
    pub fn has_failures(&self) -> bool {
        !self.failed_files.is_empty()
    }
}

/// Result of probing both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub sharepoint: bool,
    pub azure_blob: bool,
    pub overall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    pub fn checked(sharepoint: bool, azure_blob: bool) -> Self {
        Self {
            sharepoint,
            azure_blob,
            overall: sharepoint && azure_blob,
            error: None,
        }
    }

    /// A check could not run at all.
    pub fn errored(error: impl fmt::Display) -> Self {
        Self {
            sharepoint: false,
            azure_blob: false,
            overall: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_message() {
        let outcome = TransferOutcome::completed(2, vec!["b.txt".to_string()]);
        assert!(outcome.success);
        assert!(outcome.has_failures());
        assert_eq!(outcome.message, "Transfer completed, success: 2, failed: 1");
    }

    #[test]
    fn test_failed_outcome() {
        let outcome = TransferOutcome::failed("listing unavailable");
        assert!(!outcome.success);
        assert_eq!(outcome.transferred_count, 0);
        assert_eq!(outcome.message, "Transfer failed: listing unavailable");
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(TransferOutcome::no_files()).unwrap();
        let object = json.as_object().unwrap();

        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["failed_files", "message", "success", "timestamp", "transferred_count"]
        );
        assert_eq!(json["message"], "No files found for transfer");
    }

    #[test]
    fn test_connection_report_json() {
        let ok = serde_json::to_value(ConnectionReport::checked(true, false)).unwrap();
        assert_eq!(ok["overall"], false);
        assert!(ok.get("error").is_none());

        let errored = serde_json::to_value(ConnectionReport::errored("boom")).unwrap();
        assert_eq!(errored["sharepoint"], false);
        assert_eq!(errored["error"], "boom");
    }
}
