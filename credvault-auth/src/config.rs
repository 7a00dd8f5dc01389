//! Flow controller configuration.

use credvault_crypto::KdfParams;

/// Tunables for the auth flows.
#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    /// Minimum accepted password length at registration and password change.
    pub min_password_len: usize,
    /// Argon2id costs for password hashing, recovery-key hashing, and the
    /// envelope wrapping key.
    pub kdf: KdfParams,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: 8,
            kdf: KdfParams::default(),
        }
    }
}
