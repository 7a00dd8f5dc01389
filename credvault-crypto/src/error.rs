//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication tag did not verify: wrong key or tampered data.
    #[error("authentication failed (wrong key or tampered data)")]
    Authentication,

    /// A stored record could not be parsed into its components.
    #[error("malformed record: {0}")]
    Format(String),

    #[error("system random source unavailable: {0}")]
    Rng(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
