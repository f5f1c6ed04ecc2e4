//! # Portico Crypto
//!
//! The crypto codec behind the encrypted API channel.
//!
//! ## Encryption Model
//!
//! Sessions use a hybrid scheme:
//!
//! 1. **Bootstrap**: the client generates a 256-bit [`SessionKey`], encrypts
//!    it to the server's long-lived RSA key (OAEP, SHA-256) and posts it once.
//!    The server recovers it with [`ServerKeyPair::decrypt`].
//! 2. **Channel**: every later request and response is an AES-256-GCM
//!    [`Envelope`] under the session key, with a fresh random 96-bit nonce
//!    per message.
//!
//! Decryption failures are deliberately coarse. AEAD tag mismatches surface
//! as [`CryptoError::Authentication`]; every RSA failure surfaces as
//! [`CryptoError::Decryption`] without saying which check failed.
//!
//! ## Usage
//!
//! ```rust
//! use portico_crypto::{aead_decrypt, aead_encrypt, SessionKey};
//!
//! let key = SessionKey::generate();
//! let envelope = aead_encrypt(&key, b"{\"info\":\"logout\"}").unwrap();
//! let plaintext = aead_decrypt(&key, &envelope).unwrap();
//! assert_eq!(plaintext, b"{\"info\":\"logout\"}");
//! ```

pub mod aead;
pub mod asym;
pub mod error;
pub mod token;

pub use aead::{aead_decrypt, aead_encrypt, AeadNonce, Envelope, SessionKey};
pub use asym::ServerKeyPair;
pub use error::{CryptoError, Result};
pub use token::generate_session_id;
