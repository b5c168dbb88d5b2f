//! Public type definitions for the keydir library.
//!
//! A [`KeyRecord`] is the unit of storage: one OpenPGP public key together
//! with the identifiers it can be looked up by and the keywords it can be
//! searched by.

use chrono::{DateTime, Utc};
use pgp::composed::SignedPublicKey;
use pgp::types::PublicKeyTrait;

use crate::error::{Error, Result};
use crate::internal::{
    fingerprint_bytes, fingerprint_to_hex, parse_public_key, public_key_to_armored,
    public_key_to_bytes, system_time_to_datetime,
};

/// Length of a v4 fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 20;

/// Length of a key ID in bytes.
pub const KEYID_LEN: usize = 8;

/// Length of a short key ID in bytes.
pub const SHORTID_LEN: usize = 4;

/// A stored OpenPGP public key.
///
/// `keyid` and `shortid` are the trailing 8 and 4 bytes of the fingerprint.
/// They are derived once when the record is built and are never validated
/// against the fingerprint again.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    /// Fingerprint as 40 lowercase hex characters
    pub fingerprint: String,
    /// Low-order 8 bytes of the fingerprint
    pub keyid: [u8; KEYID_LEN],
    /// Low-order 4 bytes of the fingerprint
    pub shortid: [u8; SHORTID_LEN],
    /// User IDs in key order, with their search keywords
    pub identities: Vec<Identity>,
    /// Creation time of the primary key
    pub creation_time: DateTime<Utc>,
    key: SignedPublicKey,
}

impl KeyRecord {
    /// Build a record from a parsed public key.
    ///
    /// # Errors
    /// Returns `Error::UnsupportedKeyVersion` if the key does not have a
    /// 20-byte fingerprint.
    pub fn from_public_key(key: SignedPublicKey) -> Result<Self> {
        let fp = fingerprint_bytes(&key.primary_key);
        if fp.len() != FINGERPRINT_LEN {
            return Err(Error::UnsupportedKeyVersion(fp.len()));
        }

        let mut keyid = [0u8; KEYID_LEN];
        keyid.copy_from_slice(&fp[FINGERPRINT_LEN - KEYID_LEN..]);
        let mut shortid = [0u8; SHORTID_LEN];
        shortid.copy_from_slice(&fp[FINGERPRINT_LEN - SHORTID_LEN..]);

        let identities = key
            .details
            .users
            .iter()
            .map(|u| Identity::new(String::from_utf8_lossy(u.id.id()).to_string()))
            .collect();

        Ok(Self {
            fingerprint: fingerprint_to_hex(&key.primary_key),
            keyid,
            shortid,
            identities,
            creation_time: system_time_to_datetime((*key.primary_key.created_at()).into()),
            key,
        })
    }

    /// Parse a record from key data (armored or binary).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_public_key(parse_public_key(data)?)
    }

    /// The underlying OpenPGP key.
    pub fn public_key(&self) -> &SignedPublicKey {
        &self.key
    }

    /// Consume the record, returning the underlying OpenPGP key.
    pub fn into_public_key(self) -> SignedPublicKey {
        self.key
    }

    /// Binary transferable public key, the persisted form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        public_key_to_bytes(&self.key)
    }

    /// ASCII-armored public key.
    pub fn to_armored(&self) -> Result<String> {
        public_key_to_armored(&self.key)
    }

    /// Key ID as 16 lowercase hex characters.
    pub fn keyid_hex(&self) -> String {
        hex::encode(self.keyid)
    }

    /// Short key ID as 8 lowercase hex characters.
    pub fn shortid_hex(&self) -> String {
        hex::encode(self.shortid)
    }

    /// All user ID strings, in key order.
    pub fn user_ids(&self) -> Vec<&str> {
        self.identities.iter().map(|i| i.uid.as_str()).collect()
    }
}

/// A user ID attached to a key, with the keywords it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The user ID as it appears on the key
    pub uid: String,
    /// Normalized search keywords
    pub keywords: Vec<String>,
}

impl Identity {
    /// Create an identity and derive its keywords from the user ID.
    pub fn new(uid: String) -> Self {
        let keywords = extract_keywords(&uid);
        Self { uid, keywords }
    }
}

/// Normalize a search term the same way keywords are normalized.
pub(crate) fn normalize_keyword(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Derive search keywords from a user ID.
///
/// Produces the full user ID, the email address, and each word, all
/// lowercased and deduplicated in order of first appearance.
fn extract_keywords(uid: &str) -> Vec<String> {
    let mut keywords = Vec::new();

    push_keyword(&mut keywords, uid);
    if let Some(email) = extract_email(uid) {
        push_keyword(&mut keywords, &email);
    }
    for word in uid.split_whitespace() {
        push_keyword(
            &mut keywords,
            word.trim_matches(|c| matches!(c, '<' | '>' | '(' | ')' | '"' | '\'' | ',')),
        );
    }

    keywords
}

fn push_keyword(keywords: &mut Vec<String>, raw: &str) {
    let keyword = normalize_keyword(raw);
    if !keyword.is_empty() && !keywords.contains(&keyword) {
        keywords.push(keyword);
    }
}

/// Extract email from a User ID string (e.g., "Name <email@example.com>").
fn extract_email(uid: &str) -> Option<String> {
    if let Some(start) = uid.find('<') {
        if let Some(end) = uid.find('>') {
            if start < end {
                return Some(uid[start + 1..end].to_string());
            }
        }
    }
    // Check if the whole thing is an email
    if uid.contains('@') && !uid.contains(' ') {
        return Some(uid.to_string());
    }
    None
}
