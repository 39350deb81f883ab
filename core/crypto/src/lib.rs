//! Secret handling for spbridge.
//!
//! Credentials in the transfer configuration are stored encrypted at rest.
//! This module provides:
//! - Authenticated encryption using XChaCha20-Poly1305
//! - A secret key type with automatic zeroization
//! - The `SecretResolver` capability used to unlock configuration secrets
//!
//! # Security Guarantees
//! - Key material and resolved secrets are zeroized on drop
//! - No plaintext or key material is ever logged

pub mod aead;
pub mod keys;
pub mod resolver;

pub use aead::{decrypt, encrypt};
pub use keys::{SecretKey, KEY_LENGTH};
pub use resolver::{KeySecretResolver, SecretResolver, SecretString};
