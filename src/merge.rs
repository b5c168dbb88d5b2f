//! Merging two copies of the same key.
//!
//! Key servers receive the same key many times: with new certifications,
//! new user IDs, new subkeys, or revocations. A merge keeps everything the
//! stored copy has and appends whatever the incoming copy adds. Nothing is
//! ever removed, so merging is idempotent and a later submission can never
//! strip a revocation.

use pgp::composed::SignedPublicKey;
use pgp::packet::Signature;
use pgp::ser::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::internal::{contains_serialized, fingerprint_to_hex};
use crate::types::KeyRecord;

/// Merge `incoming` into `existing`.
///
/// The result is `existing` plus the set-union of:
/// - revocation and direct-key signatures,
/// - user IDs (matched by their bytes) and their certifications,
/// - user attributes (matched by their encoding) and their certifications,
/// - subkeys (matched by fingerprint) and their binding signatures.
///
/// Signatures are compared by their encoding. Existing items keep their
/// order; new items are appended in incoming order.
///
/// # Errors
/// Returns `Error::FingerprintMismatch` if the records are different keys.
pub fn merge_keys(existing: &KeyRecord, incoming: &KeyRecord) -> Result<KeyRecord> {
    if existing.fingerprint != incoming.fingerprint {
        return Err(Error::FingerprintMismatch {
            existing: existing.fingerprint.clone(),
            incoming: incoming.fingerprint.clone(),
        });
    }

    let mut merged = existing.public_key().clone();
    let added = merge_into(&mut merged, incoming.public_key())?;
    debug!(fingerprint = %existing.fingerprint, added, "Merged key material");

    KeyRecord::from_public_key(merged)
}

/// Union `theirs` into `ours`, returning how many items were added.
fn merge_into(ours: &mut SignedPublicKey, theirs: &SignedPublicKey) -> Result<usize> {
    let mut added = 0;

    added += union_signatures(
        &mut ours.details.revocation_signatures,
        &theirs.details.revocation_signatures,
    )?;
    added += union_signatures(
        &mut ours.details.direct_signatures,
        &theirs.details.direct_signatures,
    )?;

    for user in &theirs.details.users {
        let position = ours
            .details
            .users
            .iter()
            .position(|u| u.id.id() == user.id.id());
        match position {
            Some(i) => {
                added += union_signatures(&mut ours.details.users[i].signatures, &user.signatures)?
            }
            None => {
                ours.details.users.push(user.clone());
                added += 1;
            }
        }
    }

    for attribute in &theirs.details.user_attributes {
        let encoded = attribute.attr.to_bytes()?;
        let mut position = None;
        for (i, existing) in ours.details.user_attributes.iter().enumerate() {
            if existing.attr.to_bytes()? == encoded {
                position = Some(i);
                break;
            }
        }
        match position {
            Some(i) => {
                added += union_signatures(
                    &mut ours.details.user_attributes[i].signatures,
                    &attribute.signatures,
                )?
            }
            None => {
                ours.details.user_attributes.push(attribute.clone());
                added += 1;
            }
        }
    }

    for subkey in &theirs.public_subkeys {
        let fingerprint = fingerprint_to_hex(&subkey.key);
        let position = ours
            .public_subkeys
            .iter()
            .position(|s| fingerprint_to_hex(&s.key) == fingerprint);
        match position {
            Some(i) => {
                added += union_signatures(&mut ours.public_subkeys[i].signatures, &subkey.signatures)?
            }
            None => {
                ours.public_subkeys.push(subkey.clone());
                added += 1;
            }
        }
    }

    Ok(added)
}

fn union_signatures(ours: &mut Vec<Signature>, theirs: &[Signature]) -> Result<usize> {
    let mut added = 0;
    for sig in theirs {
        if !contains_serialized(ours, sig)? {
            ours.push(sig.clone());
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{generate_key, record};

    #[test]
    fn test_merge_identical_is_noop() {
        let key = record(generate_key(&["Alice <alice@example.com>"]));

        let merged = merge_keys(&key, &key).unwrap();
        assert_eq!(merged.fingerprint, key.fingerprint);
        assert_eq!(merged.to_bytes().unwrap(), key.to_bytes().unwrap());
    }

    #[test]
    fn test_merge_adds_user() {
        let full = generate_key(&["Alice <alice@example.com>", "Alice <alice@work.example>"]);
        let mut partial = full.clone();
        partial.details.users.truncate(1);

        let merged = merge_keys(&record(partial), &record(full)).unwrap();
        assert_eq!(
            merged.user_ids(),
            vec!["Alice <alice@example.com>", "Alice <alice@work.example>"]
        );
    }

    #[test]
    fn test_merge_never_removes() {
        let full = generate_key(&["Alice <alice@example.com>", "Alice <alice@work.example>"]);
        let mut partial = full.clone();
        partial.details.users.truncate(1);
        partial.public_subkeys.clear();

        let merged = merge_keys(&record(full.clone()), &record(partial)).unwrap();
        assert_eq!(merged.identities.len(), 2);
        assert_eq!(
            merged.public_key().public_subkeys.len(),
            full.public_subkeys.len()
        );
    }

    #[test]
    fn test_merge_adds_subkey() {
        let full = generate_key(&["Alice <alice@example.com>"]);
        let mut bare = full.clone();
        bare.public_subkeys.clear();

        let merged = merge_keys(&record(bare), &record(full.clone())).unwrap();
        assert_eq!(merged.public_key().public_subkeys.len(), 1);
        assert_eq!(merged.to_bytes().unwrap(), record(full).to_bytes().unwrap());
    }

    #[test]
    fn test_merge_unions_signatures() {
        let full = generate_key(&["Alice <alice@example.com>"]);
        let mut unsigned = full.clone();
        unsigned.details.users[0].signatures.clear();

        let merged = merge_keys(&record(unsigned), &record(full.clone())).unwrap();
        assert_eq!(
            merged.public_key().details.users[0].signatures.len(),
            full.details.users[0].signatures.len()
        );
    }

    #[test]
    fn test_merge_fingerprint_mismatch() {
        let alice = record(generate_key(&["Alice <alice@example.com>"]));
        let bob = record(generate_key(&["Bob <bob@example.com>"]));

        let result = merge_keys(&alice, &bob);
        assert!(matches!(result, Err(Error::FingerprintMismatch { .. })));
    }
}
