//! # Envelope Codec
//!
//! Turns values into stored records and back. A record is the JSON text of
//! the value, or, with encryption on, a token produced by the configured
//! [`EncryptionService`] around that JSON text.
//!
//! Decoding never fails: a record that cannot be verified or parsed (tampered,
//! sealed under another secret, written with the other encryption setting,
//! or shaped for a different type) decodes to `None` and is handled by the
//! engine exactly like a miss.

use super::encryption::EncryptionService;
use crate::core::error::{CacheResult, RedcacheError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stateless encode/decode given the encryption settings
#[derive(Clone)]
pub struct EnvelopeCodec {
    encrypt: bool,
    secret: Option<Arc<[u8]>>,
    cipher: Arc<dyn EncryptionService>,
}

impl EnvelopeCodec {
    pub fn new(encrypt: bool, secret: Option<&str>, cipher: Arc<dyn EncryptionService>) -> Self {
        Self {
            encrypt,
            secret: secret.map(|s| Arc::from(s.as_bytes())),
            cipher,
        }
    }

    pub fn encrypts(&self) -> bool {
        self.encrypt
    }

    /// Serialize `value` into the bytes to store
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>> {
        let json = serde_json::to_vec(value)?;
        if !self.encrypt {
            return Ok(json);
        }
        self.encrypt(&json).map(String::into_bytes)
    }

    /// Seal already-serialized bytes, returning the token verbatim
    pub fn encrypt(&self, json: &[u8]) -> CacheResult<String> {
        let secret = self.secret()?;
        self.cipher.generate(secret, json)
    }

    /// Turn stored bytes back into a value; `None` means "treat as miss"
    pub fn decode<T: DeserializeOwned>(&self, stored: Option<&[u8]>) -> Option<T> {
        let stored = stored?;

        let json = if self.encrypt {
            let secret = self.secret().ok()?;
            match self.cipher.verify(secret, stored) {
                Some(json) => json,
                None => {
                    debug!("Stored record failed verification, treating as miss");
                    return None;
                }
            }
        } else {
            stored.to_vec()
        };

        match serde_json::from_slice(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Stored record is not valid for the requested type, treating as miss: {}", e);
                None
            }
        }
    }

    fn secret(&self) -> CacheResult<&[u8]> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(RedcacheError::encryption("encryption is enabled but no secret is set")),
        }
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("encrypt", &self.encrypt)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
