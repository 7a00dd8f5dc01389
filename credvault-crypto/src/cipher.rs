//! Authenticated encryption of individual credential fields.
//!
//! Every sensitive field of a stored app credential (`app_password`,
//! `app_recovery_key`, notes) is a ChaCha20-Poly1305 ciphertext record
//! under the owning user's master key, with the field class bound as
//! associated data so a record cannot be replayed into a different field.
//!
//! Record format: `<hex nonce>.<hex ciphertext>.<hex tag>` (12-byte nonce,
//! 16-byte tag), shared with the key envelope in [`crate::envelope`].

use crate::error::{CryptoError, CryptoResult};
use crate::key::UserKey;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::TryRngCore;

/// AEAD nonce size, in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size, in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Which credential field a ciphertext record protects.
///
/// The label is bound as associated data, so decrypting an `app_password`
/// record as a note fails authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldClass {
    AppPassword,
    AppRecoveryKey,
    Notes,
}

impl FieldClass {
    pub fn label(self) -> &'static str {
        match self {
            FieldClass::AppPassword => "app-password",
            FieldClass::AppRecoveryKey => "app-recovery-key",
            FieldClass::Notes => "app-notes",
        }
    }
}

/// Encrypts bytes under `key` into a `nonce.ciphertext.tag` hex record.
pub(crate) fn seal_record(key: &UserKey, aad: &[u8], plaintext: &[u8]) -> CryptoResult<String> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("aead seal failed".into()))?;

    // encrypt() appends the tag; split it back out for the stored format
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
    Ok(format!(
        "{}.{}.{}",
        hex::encode(nonce_bytes),
        hex::encode(ciphertext),
        hex::encode(tag)
    ))
}

/// Decrypts a `nonce.ciphertext.tag` hex record under `key`.
pub(crate) fn open_record(key: &UserKey, aad: &[u8], record: &str) -> CryptoResult<Vec<u8>> {
    let mut parts = record.split('.');
    let (nonce_hex, ct_hex, tag_hex) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(n), Some(c), Some(t), None) => (n, c, t),
        _ => {
            return Err(CryptoError::Format(
                "ciphertext record must have three dot-separated parts".into(),
            ))
        }
    };

    let nonce = hex::decode(nonce_hex)
        .map_err(|e| CryptoError::Format(format!("ciphertext record nonce: {e}")))?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Format(format!(
            "nonce length {} (expected {NONCE_SIZE})",
            nonce.len()
        )));
    }
    let mut sealed = hex::decode(ct_hex)
        .map_err(|e| CryptoError::Format(format!("ciphertext record body: {e}")))?;
    let tag = hex::decode(tag_hex)
        .map_err(|e| CryptoError::Format(format!("ciphertext record tag: {e}")))?;
    if tag.len() != TAG_SIZE {
        return Err(CryptoError::Format(format!(
            "tag length {} (expected {TAG_SIZE})",
            tag.len()
        )));
    }
    sealed.extend_from_slice(&tag);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &sealed,
                aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

/// Encrypts a credential field under the user's master key.
pub fn encrypt_field(plaintext: &str, key: &UserKey, class: FieldClass) -> CryptoResult<String> {
    seal_record(key, class.label().as_bytes(), plaintext.as_bytes())
}

/// Decrypts a credential field record produced by [`encrypt_field`].
pub fn decrypt_field(record: &str, key: &UserKey, class: FieldClass) -> CryptoResult<String> {
    let plaintext = open_record(key, class.label().as_bytes(), record)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Format("decrypted field is not valid UTF-8".into()))
}

/// Whether a stored value has the shape of a ciphertext record.
///
/// Used by the flow controller to assert the at-rest discipline; it does
/// not prove the record authenticates.
pub fn is_ciphertext_record(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && parts[0].len() == NONCE_SIZE * 2
        && parts[2].len() == TAG_SIZE * 2
        && parts
            .iter()
            .all(|p| p.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_round_trip() {
        let key = UserKey::generate().unwrap();
        let record = encrypt_field("hunter2", &key, FieldClass::AppPassword).unwrap();

        assert_ne!(record, "hunter2");
        assert!(is_ciphertext_record(&record));
        let plain = decrypt_field(&record, &key, FieldClass::AppPassword).unwrap();
        assert_eq!(plain, "hunter2");
    }

    #[test]
    fn empty_string_round_trip() {
        let key = UserKey::generate().unwrap();
        let record = encrypt_field("", &key, FieldClass::Notes).unwrap();
        assert_eq!(decrypt_field(&record, &key, FieldClass::Notes).unwrap(), "");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let key = UserKey::generate().unwrap();
        let other = UserKey::generate().unwrap();
        let record = encrypt_field("hunter2", &key, FieldClass::AppPassword).unwrap();

        assert!(matches!(
            decrypt_field(&record, &other, FieldClass::AppPassword),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn wrong_field_class_fails_authentication() {
        let key = UserKey::generate().unwrap();
        let record = encrypt_field("hunter2", &key, FieldClass::AppPassword).unwrap();

        assert!(matches!(
            decrypt_field(&record, &key, FieldClass::Notes),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn malformed_record_is_a_format_error() {
        let key = UserKey::generate().unwrap();
        for bad in ["", "a.b", "a.b.c.d", "zz.zz.zz"] {
            assert!(matches!(
                decrypt_field(bad, &key, FieldClass::AppPassword),
                Err(CryptoError::Format(_))
            ));
        }
    }
}
