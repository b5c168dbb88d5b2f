//! Shared test utilities.
//!
//! Generates real OpenPGP keys so tests exercise the same parsing and
//! serialization paths as production data. Feature-gated behind `testutil`
//! to stay out of production builds.
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! keydir = { path = ".", features = ["testutil"] }
//! ```

use pgp::composed::{KeyType, SecretKeyParamsBuilder, SignedPublicKey, SubkeyParamsBuilder};
use pgp::crypto::ecc_curve::ECCCurve;
use pgp::types::Password;
use rand::thread_rng;

use crate::internal::{public_key_to_armored, public_key_to_bytes};
use crate::types::KeyRecord;

/// Generate an unprotected Ed25519 key with one Curve25519 encryption subkey.
///
/// The first user ID is the primary one.
///
/// # Panics
/// Panics if `user_ids` is empty or key generation fails.
#[must_use]
pub fn generate_key(user_ids: &[&str]) -> SignedPublicKey {
    assert!(!user_ids.is_empty(), "at least one user ID is required");
    let mut rng = thread_rng();

    let mut enc_builder = SubkeyParamsBuilder::default();
    enc_builder
        .key_type(KeyType::ECDH(ECCCurve::Curve25519))
        .can_encrypt(true)
        .can_sign(false)
        .can_authenticate(false);
    let encryption_subkey = enc_builder.build().expect("subkey params");

    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Ed25519Legacy)
        .can_certify(true)
        .can_sign(true)
        .can_encrypt(false)
        .primary_user_id(user_ids[0].to_string())
        .subkeys(vec![encryption_subkey]);

    if user_ids.len() > 1 {
        key_params.user_ids(user_ids[1..].iter().map(|s| s.to_string()).collect());
    }

    let secret_key = key_params
        .build()
        .expect("key params")
        .generate(&mut rng)
        .expect("key generation")
        .sign(&mut rng, &Password::empty())
        .expect("key signing");

    secret_key.signed_public_key()
}

/// Wrap a key in a record.
///
/// # Panics
/// Panics if the key does not have a v4 fingerprint.
#[must_use]
pub fn record(key: SignedPublicKey) -> KeyRecord {
    KeyRecord::from_public_key(key).expect("v4 key")
}

/// Binary transferable form of a key.
#[must_use]
pub fn key_bytes(key: &SignedPublicKey) -> Vec<u8> {
    public_key_to_bytes(key).expect("serialize key")
}

/// ASCII-armored form of a key.
#[must_use]
pub fn key_armored(key: &SignedPublicKey) -> String {
    public_key_to_armored(key).expect("armor key")
}

/// Concatenate several keys into one binary keyring.
#[must_use]
pub fn keyring_bytes(keys: &[&SignedPublicKey]) -> Vec<u8> {
    keys.iter().flat_map(|key| key_bytes(key)).collect()
}
