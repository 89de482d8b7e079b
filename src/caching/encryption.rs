//! # Encryption Service
//!
//! Authenticated, secret-keyed, URL-safe tokens for cached values.
//!
//! [`TokenCipher`] produces tokens laid out as
//! `version (1 byte) | nonce (12 bytes) | AES-256-GCM ciphertext + tag`,
//! encoded as unpadded URL-safe base64. The AES key is the SHA-256 digest of the
//! configured secret, and the version byte is bound as associated data.

use crate::core::error::{CacheResult, RedcacheError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::debug;

const TOKEN_VERSION: u8 = 0x91;
const TAG_LEN: usize = 16;

/// Capability interface for the authenticated-encryption primitive
pub trait EncryptionService: Send + Sync {
    /// Seal `message` under `secret`, returning an opaque token
    fn generate(&self, secret: &[u8], message: &[u8]) -> CacheResult<String>;

    /// Verify `token` under `secret`, returning the original message.
    ///
    /// `None` covers every rejection: malformed token, wrong secret, tampering.
    fn verify(&self, secret: &[u8], token: &[u8]) -> Option<Vec<u8>>;
}

/// AES-256-GCM token implementation of [`EncryptionService`]
pub struct TokenCipher {
    rng: SystemRandom,
}

impl TokenCipher {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn key(secret: &[u8]) -> CacheResult<LessSafeKey> {
        let digest = Sha256::digest(secret);
        let unbound = UnboundKey::new(&AES_256_GCM, digest.as_slice())
            .map_err(|_| RedcacheError::encryption("failed to derive AES-256-GCM key"))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl Default for TokenCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl EncryptionService for TokenCipher {
    fn generate(&self, secret: &[u8], message: &[u8]) -> CacheResult<String> {
        let key = Self::key(secret)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| RedcacheError::encryption("failed to generate nonce"))?;

        let mut in_out = message.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from([TOKEN_VERSION]),
            &mut in_out,
        )
        .map_err(|_| RedcacheError::encryption("failed to seal message"))?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&in_out);

        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    fn verify(&self, secret: &[u8], token: &[u8]) -> Option<Vec<u8>> {
        let raw = match URL_SAFE_NO_PAD.decode(token) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Rejected token that is not URL-safe base64: {}", e);
                return None;
            }
        };

        if raw.len() < 1 + NONCE_LEN + TAG_LEN || raw[0] != TOKEN_VERSION {
            debug!("Rejected token with bad length or version");
            return None;
        }

        let nonce: [u8; NONCE_LEN] = raw[1..1 + NONCE_LEN].try_into().ok()?;
        let mut sealed = raw[1 + NONCE_LEN..].to_vec();

        let key = Self::key(secret).ok()?;
        let plaintext = key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce),
                Aad::from([TOKEN_VERSION]),
                &mut sealed,
            )
            .ok()?;

        Some(plaintext.to_vec())
    }
}
