//! SharePoint document library source for spbridge.
//!
//! This module provides a source backed by Microsoft Graph with:
//! - OAuth2 client-credentials authentication against Azure AD
//! - A lazily fetched, instance-owned bearer token
//! - Folder listing (files only) and download by item identifier

pub mod auth;
pub mod client;

pub use auth::{AccessToken, ClientCredentials, TokenCache};
pub use client::{children_url, extract_site_id, DriveItem, SharePointClient, SharePointConfig};
