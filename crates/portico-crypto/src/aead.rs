//! AES-256-GCM session envelopes.
//!
//! An [`Envelope`] is the wire form of one AEAD operation: a 12-byte nonce
//! and the ciphertext (with its 16-byte tag appended), both standard base64.
//!
//! ```json
//! {"nonce": "q83vEjRWeJCrze8S", "ciphertext": "..."}
//! ```

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::prelude::*;
use portico_core::SESSION_KEY_LEN;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

/// Nonce length for AES-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// A 256-bit symmetric session key.
///
/// Never printed: the `Debug` impl is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SESSION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Decode a standard-base64 key, as sent by the client during handshake.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0.into())
    }

    /// Encrypt data with this key under an explicit nonce.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &AeadNonce) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &AeadNonce) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| CryptoError::Authentication)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// A 96-bit AES-GCM nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeadNonce(pub [u8; NONCE_LEN]);

impl AeadNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Wire form of an AEAD-encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 nonce, unique per encryption.
    pub nonce: String,
    /// Base64 ciphertext, including the authentication tag.
    pub ciphertext: String,
}

impl Envelope {
    /// Encrypt plaintext under `key` with a fresh nonce.
    pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Self> {
        let nonce = AeadNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;
        Ok(Self::from_parts(&nonce, &ciphertext))
    }

    /// Decrypt with `key`.
    pub fn open(&self, key: &SessionKey) -> Result<Vec<u8>> {
        let nonce = self.nonce_bytes()?;
        let ciphertext = self.ciphertext_bytes()?;
        key.decrypt(&ciphertext, &nonce)
    }

    /// Build an envelope from raw nonce and ciphertext bytes.
    pub fn from_parts(nonce: &AeadNonce, ciphertext: &[u8]) -> Self {
        Self {
            nonce: BASE64_STANDARD.encode(nonce.0),
            ciphertext: BASE64_STANDARD.encode(ciphertext),
        }
    }

    /// Decode the nonce field.
    pub fn nonce_bytes(&self) -> Result<AeadNonce> {
        let bytes = BASE64_STANDARD
            .decode(&self.nonce)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("nonce: {}", e)))?;
        let array: [u8; NONCE_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!("nonce must be 12 bytes, got {}", bytes.len()))
        })?;
        Ok(AeadNonce(array))
    }

    /// Decode the ciphertext field.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        BASE64_STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("ciphertext: {}", e)))
    }
}

/// Encrypt `plaintext` under `key` into a fresh envelope.
pub fn aead_encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<Envelope> {
    Envelope::seal(key, plaintext)
}

/// Decrypt an envelope under `key`.
///
/// Fails with [`CryptoError::Authentication`] if the tag does not verify.
pub fn aead_decrypt(key: &SessionKey, envelope: &Envelope) -> Result<Vec<u8>> {
    envelope.open(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SessionKey::generate();
        let envelope = aead_encrypt(&key, b"hello, world!").unwrap();
        assert_ne!(envelope.ciphertext_bytes().unwrap(), b"hello, world!");

        let decrypted = aead_decrypt(&key, &envelope).unwrap();
        assert_eq!(decrypted, b"hello, world!");
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SessionKey::generate();
        let key2 = SessionKey::generate();

        let envelope = aead_encrypt(&key1, b"secret").unwrap();

        assert!(matches!(
            aead_decrypt(&key2, &envelope),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_tamper_every_ciphertext_byte() {
        let key = SessionKey::generate();
        let envelope = aead_encrypt(&key, b"{\"info\":\"authorize\"}").unwrap();
        let nonce = envelope.nonce_bytes().unwrap();
        let ciphertext = envelope.ciphertext_bytes().unwrap();

        for i in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[i] ^= 1 << bit;
                let forged = Envelope::from_parts(&nonce, &tampered);
                assert!(
                    matches!(aead_decrypt(&key, &forged), Err(CryptoError::Authentication)),
                    "flip at byte {} bit {} was not detected",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_tamper_every_nonce_bit() {
        let key = SessionKey::generate();
        let envelope = aead_encrypt(&key, b"payload").unwrap();
        let nonce = envelope.nonce_bytes().unwrap();
        let ciphertext = envelope.ciphertext_bytes().unwrap();

        for i in 0..NONCE_LEN {
            for bit in 0..8 {
                let mut tampered = nonce;
                tampered.0[i] ^= 1 << bit;
                let forged = Envelope::from_parts(&tampered, &ciphertext);
                assert!(matches!(
                    aead_decrypt(&key, &forged),
                    Err(CryptoError::Authentication)
                ));
            }
        }
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = SessionKey::generate();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let envelope = aead_encrypt(&key, b"same plaintext").unwrap();
            assert!(seen.insert(envelope.nonce), "nonce repeated");
        }
    }

    #[test]
    fn test_malformed_envelope() {
        let key = SessionKey::generate();
        let bad_base64 = Envelope {
            nonce: "***".into(),
            ciphertext: "AAAA".into(),
        };
        assert!(matches!(
            aead_decrypt(&key, &bad_base64),
            Err(CryptoError::MalformedEnvelope(_))
        ));

        let short_nonce = Envelope {
            nonce: BASE64_STANDARD.encode([0u8; 8]),
            ciphertext: BASE64_STANDARD.encode([0u8; 32]),
        };
        assert!(matches!(
            aead_decrypt(&key, &short_nonce),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            SessionKey::from_slice(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        let encoded = BASE64_STANDARD.encode([7u8; 31]);
        assert!(matches!(
            SessionKey::from_base64(&encoded),
            Err(CryptoError::InvalidKeyLength(31))
        ));

        let key = SessionKey::generate();
        assert_eq!(SessionKey::from_base64(&key.to_base64()).unwrap(), key);
    }

    #[test]
    fn test_envelope_json_shape() {
        let key = SessionKey::generate();
        let envelope = aead_encrypt(&key, b"x").unwrap();
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value["nonce"].is_string());
        assert!(value["ciphertext"].is_string());
        // 1 byte of plaintext + 16 bytes of tag.
        assert_eq!(envelope.ciphertext_bytes().unwrap().len(), 17);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SessionKey::from_bytes([0x41; 32]);
        assert_eq!(format!("{:?}", key), "SessionKey([REDACTED])");
    }

    proptest! {
        #[test]
        fn roundtrip_any_key_any_plaintext(
            key_bytes in any::<[u8; 32]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let key = SessionKey::from_bytes(key_bytes);
            let envelope = aead_encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(aead_decrypt(&key, &envelope).unwrap(), plaintext);
        }
    }
}
