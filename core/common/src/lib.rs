//! Common utilities and types shared across spbridge modules.
//!
//! This module provides foundational types that are used throughout the codebase:
//! the shared error type, source folder paths, listing snapshots and the
//! metadata map attached to written objects.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FolderPath, ObjectMetadata, RemoteFile};
