//! Envelope encryption of the per-user master key.
//!
//! A random 256-bit user key protects all of a user's stored app
//! credentials. It is never persisted in the clear: a wrapping key is
//! derived from the recovery key (Argon2id over a dedicated salt) and
//! used to encrypt the user key with ChaCha20-Poly1305. Only the wrapped
//! blob and the KDF salt are stored.
//!
//! The account password never participates in this derivation: a password
//! compromise must not expose stored credentials.

use crate::cipher::{open_record, seal_record};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, UserKey, KEY_SIZE};
use serde::{Deserialize, Serialize};

/// The two persisted halves of the key envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrappedUserKey {
    /// `<hex nonce>.<hex ciphertext>.<hex tag>` over the raw user key.
    pub encrypted_user_key: String,
    /// Hex salt for deriving the wrapping key from the recovery key.
    /// Distinct from the recovery key's verification-hash salt.
    pub kdf_salt: String,
}

/// Generates a fresh user master key and wraps it under the recovery key.
///
/// Returns the plaintext key as well so the caller can unlock the newly
/// created vault without a second KDF pass.
pub fn wrap_user_key(
    recovery_key: &str,
    params: &KdfParams,
) -> CryptoResult<(UserKey, WrappedUserKey)> {
    let user_key = UserKey::generate()?;
    let kdf_salt = Salt::random()?;
    let wrapping_key = derive_key(recovery_key, &kdf_salt, params)?;

    let encrypted_user_key = seal_record(&wrapping_key, b"", user_key.as_bytes())?;

    Ok((
        user_key,
        WrappedUserKey {
            encrypted_user_key,
            kdf_salt: kdf_salt.to_hex(),
        },
    ))
}

/// Unwraps the user master key using the recovery key.
///
/// Fails with [`CryptoError::Authentication`] on a wrong recovery key or
/// tampered blob, and with [`CryptoError::Format`] if the stored value
/// cannot be parsed.
pub fn unwrap_user_key(
    encrypted_user_key: &str,
    recovery_key: &str,
    kdf_salt: &str,
    params: &KdfParams,
) -> CryptoResult<UserKey> {
    let salt = Salt::from_hex(kdf_salt)?;
    let wrapping_key = derive_key(recovery_key, &salt, params)?;

    let plaintext = open_record(&wrapping_key, b"", encrypted_user_key)?;
    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: plaintext.len(),
        });
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    Ok(UserKey::from_bytes(bytes))
}
