//! Internal helper functions.

use std::io::Cursor;

use pgp::composed::{Deserializable, SignedPublicKey};
use pgp::ser::Serialize;
use pgp::types::KeyDetails;

use crate::error::{Error, Result};

/// Parse a public key from bytes (armored or binary).
pub(crate) fn parse_public_key(data: &[u8]) -> Result<SignedPublicKey> {
    // Try armored first, then binary
    let cursor = Cursor::new(data);
    if let Ok((key, _headers)) = SignedPublicKey::from_armor_single(cursor) {
        return Ok(key);
    }

    let cursor = Cursor::new(data);
    SignedPublicKey::from_bytes(cursor).map_err(|e| Error::Parse(e.to_string()))
}

/// Serialize a public key to its binary transferable form.
pub(crate) fn public_key_to_bytes(key: &SignedPublicKey) -> Result<Vec<u8>> {
    Ok(key.to_bytes()?)
}

/// Serialize a public key to ASCII-armored format.
pub(crate) fn public_key_to_armored(key: &SignedPublicKey) -> Result<String> {
    Ok(key.to_armored_string(None.into())?)
}

/// Raw fingerprint bytes of a key.
pub(crate) fn fingerprint_bytes(key: &impl KeyDetails) -> Vec<u8> {
    key.fingerprint().as_bytes().to_vec()
}

/// Get the fingerprint as a hex string (lowercase, no spaces).
pub(crate) fn fingerprint_to_hex(key: &impl KeyDetails) -> String {
    hex::encode(key.fingerprint().as_bytes())
}

/// Convert a SystemTime to chrono DateTime.
pub(crate) fn system_time_to_datetime(st: std::time::SystemTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from(st)
}

/// Whether a serialized item is already present in `existing`.
pub(crate) fn contains_serialized<T: Serialize>(existing: &[T], item: &T) -> Result<bool> {
    let needle = item.to_bytes()?;
    for candidate in existing {
        if candidate.to_bytes()? == needle {
            return Ok(true);
        }
    }
    Ok(false)
}
