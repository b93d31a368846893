//! At-rest encryption for cache payloads, using AES-256-GCM.
//!
//! Every cache payload is sealed with the store's derived key and the
//! cache key as associated data, so a ciphertext copied between slots
//! fails authentication instead of decrypting under the wrong name.

use crate::error::{StoreError, StoreResult};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload, generic_array::GenericArray},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// HKDF context string binding derived keys to this use.
const HKDF_INFO: &[u8] = b"carnet-cache-encryption-v1";

/// Encryption key for AES-256-GCM.
///
/// Zeroized when dropped; `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StoreError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives the cache key from an installation seed using HKDF-SHA256.
    ///
    /// The seed is the random 32-byte value persisted in the store
    /// directory; deriving (rather than using the seed directly) keeps the
    /// actual AES key out of any file and bound to this context string.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive_from_seed(seed: &[u8]) -> StoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(None, seed);

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|_| StoreError::Encryption("HKDF expand failed".to_string()))?;

        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Seals and opens cache payloads.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl CryptoManager {
    /// Creates a crypto manager with the given key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        // Infallible: EncryptionKey.bytes is always exactly KEY_SIZE bytes,
        // which is AES-256's key size.
        let key_array = GenericArray::from_slice(key.as_bytes());
        let cipher = Aes256Gcm::new(key_array);
        Self { cipher }
    }

    /// Encrypts a payload, authenticating `aad` alongside it.
    ///
    /// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    /// A fresh random nonce is drawn per call.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| StoreError::Encryption("encryption failed".to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);

        Ok(result)
    }

    /// Decrypts a payload sealed with [`seal`](Self::seal).
    ///
    /// The same AAD must be supplied as was used to seal.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input, a wrong key, tampered
    /// ciphertext, or mismatched AAD.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StoreError::Encryption("ciphertext too short".to_string()));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let encrypted = &sealed[NONCE_SIZE..];

        let payload = Payload {
            msg: encrypted,
            aad,
        };

        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| StoreError::Encryption("authentication failed".to_string()))
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
