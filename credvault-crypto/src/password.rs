//! Salted password hashing with constant-time verification.
//!
//! Stored record format is `<hex digest>.<hex salt>`: a 64-byte Argon2id
//! digest over a fresh 16-byte salt. The same construction backs recovery
//! key verification (see [`crate::recovery`]) with an independent salt.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_into, KdfParams, Salt};
use subtle::ConstantTimeEq;

/// Size of the stored verification digest, in bytes.
pub const DIGEST_SIZE: usize = 64;

/// Hashes a secret into a `<hex digest>.<hex salt>` record.
pub(crate) fn hash_secret(secret: &str, params: &KdfParams) -> CryptoResult<String> {
    let salt = Salt::random()?;
    let mut digest = [0u8; DIGEST_SIZE];
    derive_into(secret, &salt, params, &mut digest)?;
    Ok(format!("{}.{}", hex::encode(digest), salt.to_hex()))
}

/// Verifies a secret against a stored record in constant time.
///
/// A record that cannot be parsed is a data-integrity fault and surfaces
/// as [`CryptoError::Format`], never as a plain mismatch.
pub(crate) fn verify_secret(secret: &str, record: &str, params: &KdfParams) -> CryptoResult<bool> {
    let (digest_hex, salt_hex) = record
        .split_once('.')
        .ok_or_else(|| CryptoError::Format("hash record missing separator".into()))?;

    let stored = hex::decode(digest_hex)
        .map_err(|e| CryptoError::Format(format!("hash record digest: {e}")))?;
    if stored.len() != DIGEST_SIZE {
        return Err(CryptoError::Format(format!(
            "hash record digest length {} (expected {DIGEST_SIZE})",
            stored.len()
        )));
    }
    let salt = Salt::from_hex(salt_hex)?;

    let mut derived = [0u8; DIGEST_SIZE];
    derive_into(secret, &salt, params, &mut derived)?;

    // Constant-time comparison; a short-circuiting == would leak a prefix
    // length through timing.
    Ok(derived.ct_eq(&stored[..]).into())
}

/// Hashes a password for storage.
pub fn hash_password(password: &str, params: &KdfParams) -> CryptoResult<String> {
    hash_secret(password, params)
}

/// Verifies a supplied password against a stored hash record.
pub fn verify_password(password: &str, record: &str, params: &KdfParams) -> CryptoResult<bool> {
    verify_secret(password, record, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KdfParams {
        KdfParams::default()
    }

    #[test]
    fn hash_verify_round_trip() {
        let record = hash_password("correcthorse", &params()).unwrap();
        assert!(verify_password("correcthorse", &record, &params()).unwrap());
        assert!(!verify_password("correcthorsE", &record, &params()).unwrap());
        assert!(!verify_password("", &record, &params()).unwrap());
    }

    #[test]
    fn record_format_is_digest_dot_salt() {
        let record = hash_password("pw", &params()).unwrap();
        let (digest, salt) = record.split_once('.').unwrap();
        assert_eq!(digest.len(), DIGEST_SIZE * 2);
        assert_eq!(salt.len(), 32);
        assert!(record.chars().all(|c| c.is_ascii_hexdigit() || c == '.'));
    }

    #[test]
    fn same_password_hashes_differently() {
        // Fresh salt per call
        let a = hash_password("pw", &params()).unwrap();
        let b = hash_password("pw", &params()).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("pw", &a, &params()).unwrap());
        assert!(verify_password("pw", &b, &params()).unwrap());
    }

    #[test]
    fn malformed_record_is_a_format_error() {
        for bad in ["", "nodot", "abc.def", "zz.zz", "deadbeef.deadbeef"] {
            assert!(
                matches!(
                    verify_password("pw", bad, &params()),
                    Err(CryptoError::Format(_)) | Err(CryptoError::InvalidKeyLength { .. })
                ),
                "record {bad:?} should not verify cleanly"
            );
        }
    }
}
