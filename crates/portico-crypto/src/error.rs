//! Error types for the crypto codec.

use thiserror::Error;

/// Errors that can occur during crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD tag did not verify: tampering, wrong key or wrong nonce.
    #[error("authentication failed")]
    Authentication,

    /// Asymmetric decryption failed. Carries no detail on purpose.
    #[error("decryption failed")]
    Decryption,

    /// Envelope fields are not valid base64 or have the wrong size.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Symmetric key material has the wrong length.
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Key loading, generation or encoding error.
    #[error("key error: {0}")]
    Key(String),

    /// I/O error while reading key material.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
