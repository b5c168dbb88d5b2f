//! Key identifier resolution.
//!
//! Key servers are asked for keys by three identifier forms of decreasing
//! precision: the full 20-byte fingerprint, the 8-byte key ID and the 4-byte
//! short ID. [`KeyQuery`] decides which one a hex string is; the store turns
//! the query into a filter.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::{FINGERPRINT_LEN, KEYID_LEN, SHORTID_LEN};

/// A parsed key identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    /// Exact match on `shortid`
    ShortId([u8; SHORTID_LEN]),
    /// Exact match on `keyid`
    KeyId([u8; KEYID_LEN]),
    /// Exact match on `fingerprint`, as lowercase hex
    Fingerprint(String),
}

impl KeyQuery {
    /// Parse an identifier string.
    ///
    /// The input is lowercased and hex-decoded; an optional `0x` prefix is
    /// accepted. The decoded length selects the query kind.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyId` if the input is not hex or does not
    /// decode to 4, 8 or 20 bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use keydir::KeyQuery;
    ///
    /// let query = KeyQuery::parse("0xDEADBEEF").unwrap();
    /// assert_eq!(query, KeyQuery::ShortId([0xde, 0xad, 0xbe, 0xef]));
    ///
    /// assert!(KeyQuery::parse("not hex").is_err());
    /// ```
    pub fn parse(id: &str) -> Result<Self> {
        let id = id.trim().to_lowercase();
        let hex_part = id.strip_prefix("0x").unwrap_or(&id);

        let raw = hex::decode(hex_part).map_err(|_| Error::InvalidKeyId(id.clone()))?;

        match raw.len() {
            SHORTID_LEN => {
                let mut shortid = [0u8; SHORTID_LEN];
                shortid.copy_from_slice(&raw);
                Ok(KeyQuery::ShortId(shortid))
            }
            KEYID_LEN => {
                let mut keyid = [0u8; KEYID_LEN];
                keyid.copy_from_slice(&raw);
                Ok(KeyQuery::KeyId(keyid))
            }
            FINGERPRINT_LEN => Ok(KeyQuery::Fingerprint(hex_part.to_string())),
            _ => Err(Error::InvalidKeyId(id)),
        }
    }

    /// Query for an exact fingerprint, as used by ingestion.
    pub(crate) fn fingerprint(fingerprint: &str) -> Self {
        KeyQuery::Fingerprint(fingerprint.to_lowercase())
    }
}

impl fmt::Display for KeyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyQuery::ShortId(id) => write!(f, "shortid {}", hex::encode(id)),
            KeyQuery::KeyId(id) => write!(f, "keyid {}", hex::encode(id)),
            KeyQuery::Fingerprint(fp) => write!(f, "fingerprint {}", fp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_id() {
        let query = KeyQuery::parse("DEADBEEF").unwrap();
        assert_eq!(query, KeyQuery::ShortId([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_parse_key_id() {
        let query = KeyQuery::parse("0123456789abcdef").unwrap();
        assert_eq!(
            query,
            KeyQuery::KeyId([0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef])
        );
    }

    #[test]
    fn test_parse_fingerprint_lowercases() {
        let query = KeyQuery::parse("A4F388BBB194925AE301F844C52B42177857DD79").unwrap();
        assert_eq!(
            query,
            KeyQuery::Fingerprint("a4f388bbb194925ae301f844c52b42177857dd79".to_string())
        );
    }

    #[test]
    fn test_parse_hex_prefix() {
        assert_eq!(
            KeyQuery::parse("0x7857DD79").unwrap(),
            KeyQuery::ShortId([0x78, 0x57, 0xdd, 0x79])
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            KeyQuery::parse("  0x7857DD79\n").unwrap(),
            KeyQuery::ShortId([0x78, 0x57, 0xdd, 0x79])
        );
    }

    #[test]
    fn test_parse_wrong_length() {
        // 7 bytes
        assert!(matches!(
            KeyQuery::parse("00112233445566"),
            Err(Error::InvalidKeyId(_))
        ));
        // 32 bytes, a v6 fingerprint
        assert!(matches!(
            KeyQuery::parse(&"ab".repeat(32)),
            Err(Error::InvalidKeyId(_))
        ));
        assert!(matches!(KeyQuery::parse(""), Err(Error::InvalidKeyId(_))));
    }

    #[test]
    fn test_parse_not_hex() {
        assert!(matches!(
            KeyQuery::parse("alice@example.com"),
            Err(Error::InvalidKeyId(_))
        ));
        // Odd number of digits
        assert!(matches!(
            KeyQuery::parse("DEADBEE"),
            Err(Error::InvalidKeyId(_))
        ));
    }

    #[test]
    fn test_display() {
        let query = KeyQuery::parse("deadbeef").unwrap();
        assert_eq!(query.to_string(), "shortid deadbeef");
    }
}
