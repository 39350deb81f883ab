//! Resolution of encrypted configuration secrets.
//!
//! Secret-bearing configuration fields hold `base64(nonce || ciphertext || tag)`.
//! A `SecretResolver` turns such a field into a usable plaintext exactly once,
//! when the transfer coordinator is constructed.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use spbridge_common::{Error, Result};

use crate::aead;
use crate::keys::SecretKey;

/// Plaintext secret that zeroizes on drop and never prints itself.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the plaintext.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED; {} bytes])", self.0.len())
    }
}

/// Capability that decrypts at-rest credential strings.
pub trait SecretResolver: Send + Sync {
    /// Decrypt a ciphertext field into its plaintext.
    ///
    /// # Errors
    /// - Malformed ciphertext
    /// - Authentication failure (wrong key or tampered data)
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString>;
}

impl<F> SecretResolver for F
where
    F: Fn(&str) -> Result<SecretString> + Send + Sync,
{
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        self(ciphertext)
    }
}

/// Resolver backed by a symmetric XChaCha20-Poly1305 key.
pub struct KeySecretResolver {
    key: SecretKey,
}

impl KeySecretResolver {
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext into the at-rest format accepted by `decrypt`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let sealed = aead::encrypt(self.key.as_bytes(), plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }
}

impl SecretResolver for KeySecretResolver {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        let sealed = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| Error::Crypto(format!("Invalid secret encoding: {}", e)))?;

        let plaintext = Zeroizing::new(aead::decrypt(self.key.as_bytes(), &sealed)?);

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::Crypto("Decrypted secret is not valid UTF-8".to_string()))?;

        debug!("Resolved configuration secret ({} bytes)", text.len());
        Ok(SecretString::new(text))
    }
}

impl fmt::Debug for KeySecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySecretResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;

    fn resolver() -> KeySecretResolver {
        KeySecretResolver::new(SecretKey::from_bytes([3u8; KEY_LENGTH]))
    }

    #[test]
    fn test_encrypt_then_resolve() {
        let resolver = resolver();
        let sealed = resolver.encrypt("s3cr3t~value").unwrap();

        assert_ne!(sealed, "s3cr3t~value");
        assert_eq!(resolver.decrypt(&sealed).unwrap().expose(), "s3cr3t~value");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = resolver().encrypt("secret").unwrap();
        let other = KeySecretResolver::new(SecretKey::from_bytes([4u8; KEY_LENGTH]));

        assert!(matches!(other.decrypt(&sealed), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_plaintext_input_is_rejected() {
        // A config that forgot to encrypt its secret must not pass through.
        assert!(resolver().decrypt("plain-client-secret").is_err());
    }

    #[test]
    fn test_closure_resolver() {
        let identity =
            |ciphertext: &str| -> Result<SecretString> { Ok(SecretString::new(ciphertext)) };
        assert_eq!(identity.decrypt("abc").unwrap().expose(), "abc");
    }

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED; 7 bytes])");
    }
}
