//! RSA-OAEP server keypair used for the handshake.
//!
//! Clients encrypt `{"key": <base64 AES key>}` (optionally with
//! `"info": "init_com"`) under the server's public key with
//! OAEP (SHA-256 for both the hash and MGF1, empty label), which is what
//! WebCrypto's `RSA-OAEP` produces.

use std::fmt;
use std::path::Path;

use base64::prelude::*;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, Result};

/// The server's long-lived RSA keypair.
///
/// The public half is cached as SPKI PEM, since it is embedded verbatim
/// into the generated `pem.js` utility.
#[derive(Clone)]
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl ServerKeyPair {
    /// Generate a fresh keypair of `bits` size.
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        Self::from_private(private)
    }

    /// Parse a private key in PKCS#8 or PKCS#1 PEM form.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        Self::from_private(private)
    }

    /// Load a PEM private key from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self> {
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        Ok(Self {
            private,
            public_pem,
        })
    }

    /// Serialize the private key as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| CryptoError::Key(e.to_string()))
    }

    /// The public key as SPKI PEM.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// The public key.
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private)
    }

    /// OAEP-decrypt a ciphertext.
    ///
    /// Every failure collapses to [`CryptoError::Decryption`] so callers
    /// cannot distinguish padding errors from wrong-key errors.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }

    /// Decode standard base64, then OAEP-decrypt.
    pub fn decrypt_base64(&self, encoded: &str) -> Result<Vec<u8>> {
        let ciphertext = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::Decryption)?;
        self.decrypt(&ciphertext)
    }
}

impl fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("private", &"[REDACTED]")
            .finish()
    }
}
