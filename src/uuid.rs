//! Opaque random identifiers.
//!
//! Used for request tokens and similar handles where the value only needs to
//! be unguessable, not meaningful.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

/// Number of random bytes behind an identifier.
const UUID_BYTES: usize = 32;

/// Length of an identifier in characters: ceil(256 / 6).
pub const UUID_LEN: usize = 43;

/// Generate a random identifier.
///
/// Reads 32 bytes from the operating system's CSPRNG and encodes them with
/// the standard base64 alphabet, unpadded.
///
/// # Errors
/// Returns `Error::IdGeneration` if the random source fails.
///
/// # Example
///
/// ```
/// use keydir::{new_uuid, UUID_LEN};
///
/// let id = new_uuid().unwrap();
/// assert_eq!(id.len(), UUID_LEN);
/// ```
pub fn new_uuid() -> Result<String> {
    let mut buf = [0u8; UUID_BYTES];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| Error::IdGeneration(e.to_string()))?;
    encode_uuid(&buf)
}

fn encode_uuid(bytes: &[u8]) -> Result<String> {
    if bytes.len() < UUID_BYTES {
        return Err(Error::IdGeneration(format!(
            "random source yielded {} of {} bytes",
            bytes.len(),
            UUID_BYTES
        )));
    }
    Ok(STANDARD_NO_PAD.encode(&bytes[..UUID_BYTES]))
}
