use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;

use crate::error::Error;
use crate::types::PersistedIdentityRecord;

/// Encrypts and decrypts the persisted identity record for cookie storage.
///
/// The record is owned by the client as an opaque blob and must never be
/// trusted without decryption. Tests substitute a trivial implementation
/// so no real cryptographic material is needed.
pub trait IdentityCodec: Send + Sync {
    /// Encrypt a record into an opaque cookie-safe string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecDecode`] if the record cannot be serialized
    /// or sealed.
    fn encrypt(&self, record: &PersistedIdentityRecord) -> Result<String, Error>;

    /// Decrypt an opaque string back into a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecDecode`] for any malformed, tampered, or
    /// wrongly keyed input. Callers treat this as a cache miss, not a
    /// fatal error.
    fn decrypt(&self, sealed: &str) -> Result<PersistedIdentityRecord, Error>;
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM codec: random 96-bit nonce prefixed to the ciphertext,
/// base64 transport encoding.
pub struct SealedCodec {
    key: Key<Aes256Gcm>,
}

impl SealedCodec {
    /// Build a codec from a secret. The secret is padded with zeroes or
    /// truncated to the 32 bytes AES-256 requires.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let secret = secret.as_bytes();
        let length = secret.len().min(32);

        let mut key_data = [0u8; 32];
        key_data[..length].copy_from_slice(&secret[..length]);

        Self {
            key: Key::<Aes256Gcm>::from(key_data),
        }
    }
}

impl IdentityCodec for SealedCodec {
    fn encrypt(&self, record: &PersistedIdentityRecord) -> Result<String, Error> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let cipher = Aes256Gcm::new(&self.key);

        let plaintext =
            serde_json::to_string(record).map_err(|e| Error::CodecDecode(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| Error::CodecDecode(e.to_string()))?;

        Ok(BASE64_STANDARD.encode(nonce.into_iter().chain(ciphertext).collect::<Vec<u8>>()))
    }

    fn decrypt(&self, sealed: &str) -> Result<PersistedIdentityRecord, Error> {
        let decoded = BASE64_STANDARD
            .decode(sealed)
            .map_err(|e| Error::CodecDecode(e.to_string()))?;

        if decoded.len() < NONCE_LEN {
            return Err(Error::CodecDecode("not enough data".into()));
        }

        let (nonce, ciphertext) = decoded.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.key);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::CodecDecode(e.to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| Error::CodecDecode(e.to_string()))
    }
}
