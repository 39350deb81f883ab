//! Source and destination clients for spbridge.
//!
//! This module provides the two capability interfaces the transfer
//! coordinator consumes, plus their implementations:
//! - `SourceDirectory`: SharePoint document libraries via Microsoft Graph
//! - `DestinationStore`: Azure Blob Storage containers
//! - In-memory implementations of both for testing
//!
//! # Design Principles
//! - Typed results at every client boundary
//! - Async operations: all network I/O is async
//! - No provider-specific logic in the coordinator

pub mod azure;
pub mod memory;
pub mod provider;
pub mod sharepoint;

pub use azure::{BlobClient, ConnectionString};
pub use memory::{HealthCheck, MemorySource, MemoryStore, StoredObject};
pub use provider::{DestinationStore, SourceDirectory};
pub use sharepoint::{extract_site_id, SharePointClient, SharePointConfig};
