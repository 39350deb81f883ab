//! Azure Blob Storage destination for spbridge.
//!
//! This module provides a destination backed by Azure Blob Storage with:
//! - Connection string parsing (account key, SAS, and development storage)
//! - Metadata-carrying blob writes and listings through OpenDAL
//! - Create-if-absent containers via Shared Key signed REST calls

pub mod client;
pub mod connection;
pub mod signing;

pub use client::{container_url, metadata_value, BlobClient};
pub use connection::{BlobCredential, ConnectionString};
pub use signing::SharedKeySigner;
