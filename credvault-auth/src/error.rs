//! Auth error taxonomy.
//!
//! Everything a user can trigger with wrong secrets collapses into
//! [`AuthError::InvalidCredentials`]: wrong username, wrong password and
//! wrong recovery key are indistinguishable, so no variant acts as an
//! account-enumeration oracle. [`AuthError::Integrity`] is reserved for
//! internally produced records that fail to parse or verify; those are
//! operational faults, never user mistakes.

use credvault_store::StorageError;
use thiserror::Error;

/// Result type for auth flow operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the registration/authentication flow controller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username already taken (including the loser of a concurrent
    /// registration race).
    #[error("username already exists")]
    Conflict,

    /// Single message for every wrong-secret outcome.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Server-mediated password reset is deliberately disabled: the server
    /// never holds the plaintext recovery key, so it cannot re-wrap the
    /// master key. Part of the external contract, not a gap.
    #[error(
        "password reset via server is disabled for security; \
         use your recovery key to set a new password"
    )]
    ResetNotSupported,

    #[error("not authenticated")]
    NotAuthenticated,

    /// Credential operations that need the master key require the session
    /// to have unlocked the vault with the recovery key first.
    #[error("vault is locked")]
    VaultLocked,

    #[error("password too short (min {0} characters)")]
    WeakPassword(usize),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Internally produced hash/ciphertext failed to parse or verify.
    /// Logged and surfaced as a fault; never retried.
    #[error("data integrity fault: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
