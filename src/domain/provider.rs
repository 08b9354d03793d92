//! Provider endpoint configuration and credential handling

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::types::{ActiveStatus, Channel};
use crate::error::{KuryrError, Result};

/// Third-party vendor endpoint for one channel.
///
/// `api_secret` is held decrypted here; at rest it is AES-GCM sealed and the
/// store decrypts on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: u64,
    pub name: String,
    pub channel: Channel,
    pub endpoint: String,
    pub region: String,
    pub api_id: String,
    pub api_secret: String,
    pub weight: i32,
    pub qps_limit: i32,
    pub daily_limit: i64,
    pub active_status: ActiveStatus,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.active_status.is_active()
    }
}

const NONCE_LEN: usize = 12;

/// Seals and opens provider secrets with AES-256-GCM.
///
/// Wire form is base64 of `nonce || ciphertext`; the nonce is random per seal.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Build from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| KuryrError::invalid_param("secret key must be 32 bytes"))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| KuryrError::internal("failed to seal api secret"))?;

        let mut buf = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        buf.extend_from_slice(nonce.as_slice());
        buf.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(buf))
    }

    pub fn open(&self, sealed: &str) -> Result<String> {
        let buf = BASE64
            .decode(sealed)
            .map_err(|_| KuryrError::internal("sealed api secret is not valid base64"))?;
        if buf.len() <= NONCE_LEN {
            return Err(KuryrError::internal("sealed api secret is truncated"));
        }

        let (nonce, ciphertext) = buf.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KuryrError::internal("failed to open api secret"))?;

        String::from_utf8(plaintext)
            .map_err(|_| KuryrError::internal("api secret is not valid utf-8"))
    }
}
