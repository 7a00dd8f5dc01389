//! Cryptographic core for CredVault.
//!
//! Provides the credential-vault primitives:
//! - Argon2id password and recovery-key hashing with constant-time verify
//! - One-time recovery key generation (`XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`)
//! - Envelope encryption of the per-user master key
//! - ChaCha20-Poly1305 encryption of individual credential fields
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **User (master) key**: a random 256-bit key generated at
//!    registration. It protects every stored app credential and is only
//!    ever persisted wrapped.
//! 2. **Wrapping key**: derived from the recovery key with Argon2id over a
//!    dedicated salt. It encrypts the user key and nothing else.
//!
//! The account password is deliberately outside this chain: it gates login
//! only, so a password compromise never exposes stored credentials.

pub mod cipher;
pub mod envelope;
mod error;
mod key;
pub mod password;
pub mod recovery;

pub use cipher::{
    decrypt_field, encrypt_field, is_ciphertext_record, FieldClass, NONCE_SIZE, TAG_SIZE,
};
pub use envelope::{unwrap_user_key, wrap_user_key, WrappedUserKey};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, KdfParams, Salt, UserKey, KEY_SIZE, SALT_SIZE};
pub use password::{hash_password, verify_password, DIGEST_SIZE};
pub use recovery::{
    generate_recovery_key, hash_recovery_key, looks_like_recovery_key, verify_recovery_key,
    RECOVERY_KEY_ALPHABET, RECOVERY_KEY_SYMBOLS,
};
