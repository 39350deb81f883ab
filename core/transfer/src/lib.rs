//! spbridge transfer service
//!
//! This module provides the coordinator that copies files from a SharePoint
//! document library into an Azure Blob container, including:
//! - Configuration validation and secret resolution at construction
//! - A sequential list → download → upload pipeline with per-file isolation
//! - Structured outcome and connection reports that never surface as errors

pub mod config;
pub mod coordinator;
pub mod outcome;

pub use config::{TransferConfig, TransferOptions, REQUIRED_FIELDS};
pub use coordinator::{ItemFailure, TransferCoordinator, SOURCE_TAG};
pub use outcome::{ConnectionReport, TransferOutcome};
