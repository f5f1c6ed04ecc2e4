//! Session identifier generation.

use portico_core::SessionId;
use rand::RngCore;

/// Generate a fresh session id from 32 bytes of OS-seeded randomness.
///
/// The handshake calls this when the request carries no usable session
/// cookie; the new id goes back to the client in the `session_id` cookie.
pub fn generate_session_id() -> SessionId {
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);
    SessionId::from_entropy(&entropy)
}
