//! API key encryption at rest.
//!
//! Exam authors may store a chat API key next to the exam configuration.
//! Keys are sealed into a versioned envelope and opened only at dispatch
//! time:
//!
//! ```text
//! enc:v1:<key-id>:<nonce-b64>:<ciphertext-b64>
//! ```
//!
//! ChaCha20-Poly1305 under a 32-byte key supplied as base64 through the
//! configuration. With no key configured, values pass through unencrypted
//! (and envelopes become unreadable); small deployments can opt out,
//! everything else sets the key.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use tracing::warn;
use vigil_application::{SecretCipher, SecretError};

const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

pub struct ApiKeyCipher {
    key: Option<KeyMaterial>,
}

struct KeyMaterial {
    key_id: String,
    key: [u8; 32],
}

impl ApiKeyCipher {
    /// A cipher with no key: encrypt passes plaintext through, decrypt
    /// refuses envelopes.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Build from a base64-encoded 32-byte key. Returns the disabled
    /// cipher (with a warning) when the encoding or length is wrong,
    /// so a misconfigured key never takes startup down.
    pub fn from_encoded_key(encoded: Option<&str>, key_id: impl Into<String>) -> Self {
        let Some(encoded) = encoded.map(str::trim).filter(|k| !k.is_empty()) else {
            return Self::disabled();
        };
        let decoded = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .or_else(|_| STANDARD.decode(encoded.as_bytes()));
        match decoded {
            Ok(bytes) if bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                Self {
                    key: Some(KeyMaterial {
                        key_id: key_id.into(),
                        key,
                    }),
                }
            }
            Ok(bytes) => {
                warn!(
                    "api key encryption key ignored: expected 32 bytes, got {}",
                    bytes.len()
                );
                Self::disabled()
            }
            Err(e) => {
                warn!("api key encryption key ignored: not valid base64: {e}");
                Self::disabled()
            }
        }
    }

    fn is_envelope(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }
}

impl SecretCipher for ApiKeyCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let Some(material) = &self.key else {
            return Ok(plaintext.to_string());
        };
        if Self::is_envelope(plaintext) {
            return Ok(plaintext.to_string());
        }

        let nonce_source = uuid::Uuid::new_v4().into_bytes();
        let nonce = Nonce::from_slice(&nonce_source[..NONCE_LEN]);
        let aead = ChaCha20Poly1305::new_from_slice(&material.key)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        let ciphertext = aead
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::Crypto(e.to_string()))?;

        let nonce_b64 = URL_SAFE_NO_PAD.encode(&nonce_source[..NONCE_LEN]);
        let ciphertext_b64 = URL_SAFE_NO_PAD.encode(ciphertext);
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{nonce_b64}:{ciphertext_b64}",
            material.key_id
        ))
    }

    fn decrypt(&self, stored: &str) -> Result<String, SecretError> {
        if !Self::is_envelope(stored) {
            // Legacy plaintext value.
            return Ok(stored.to_string());
        }
        let Some(material) = &self.key else {
            return Err(SecretError::NotConfigured);
        };

        let rest = stored
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(SecretError::Malformed)?;
        let mut parts = rest.splitn(3, ':');
        let (Some(_key_id), Some(nonce_b64), Some(ciphertext_b64)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(SecretError::Malformed);
        };

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| SecretError::Malformed)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(SecretError::Malformed);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| SecretError::Malformed)?;

        let aead = ChaCha20Poly1305::new_from_slice(&material.key)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|_| SecretError::Malformed)
    }
}
