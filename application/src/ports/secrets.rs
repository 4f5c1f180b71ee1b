//! Secret cipher port
//!
//! Exam authors may store an API key alongside the exam configuration. The
//! key is held encrypted at rest and decrypted only at dispatch time.

use thiserror::Error;

/// Errors surfaced by the secret cipher.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret is encrypted but no decryption key is configured")]
    NotConfigured,

    #[error("Malformed secret envelope")]
    Malformed,

    #[error("Cipher failure: {0}")]
    Crypto(String),
}

/// Encrypts and decrypts stored API keys.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, SecretError>;

    fn decrypt(&self, stored: &str) -> Result<String, SecretError>;
}
