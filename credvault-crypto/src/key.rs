//! Key material: salts, user master keys, and Argon2id derivation.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::TryRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of all random salts (password hashing and key wrapping), in bytes.
pub const SALT_SIZE: usize = 16;

/// Size of symmetric keys (user master key, wrapping key), in bytes.
pub const KEY_SIZE: usize = 32;

/// A random salt with hex round-tripping for the stored record formats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt from the OS CSPRNG.
    pub fn random() -> CryptoResult<Self> {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a salt from its stored hex form.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::Format(format!("salt hex: {e}")))?;
        if bytes.len() != SALT_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SALT_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SALT_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// A 256-bit symmetric key. Zeroized on drop.
///
/// Used both for the per-user master key and for wrapping keys derived
/// from the recovery key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UserKey([u8; KEY_SIZE]);

impl UserKey {
    /// Generates a fresh random key from the OS CSPRNG.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for UserKey {
    // Key bytes must never reach logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserKey(..)")
    }
}

/// Argon2id cost parameters.
///
/// Defaults follow the OWASP recommendation (19 MiB, 2 iterations, 1 lane).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Derives `out.len()` bytes from a secret string and salt via Argon2id.
///
/// Both the password/recovery-key verification hashes and the envelope
/// wrapping key go through this single derivation path; they differ only
/// in salt and output length.
pub fn derive_into(
    secret: &str,
    salt: &Salt,
    params: &KdfParams,
    out: &mut [u8],
) -> CryptoResult<()> {
    let argon_params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(out.len()))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    argon
        .hash_password_into(secret.as_bytes(), salt.as_bytes(), out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derives a 256-bit key from a secret string and salt.
pub fn derive_key(secret: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<UserKey> {
    let mut bytes = [0u8; KEY_SIZE];
    derive_into(secret, salt, params, &mut bytes)?;
    let key = UserKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salt_hex_round_trip() {
        let salt = Salt::random().unwrap();
        let parsed = Salt::from_hex(&salt.to_hex()).unwrap();
        assert_eq!(salt, parsed);
    }

    #[test]
    fn salt_rejects_wrong_length_hex() {
        assert!(matches!(
            Salt::from_hex("deadbeef"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
        assert!(matches!(Salt::from_hex("zz"), Err(CryptoError::Format(_))));
    }

    #[test]
    fn derivation_is_deterministic_per_salt() {
        let salt = Salt::random().unwrap();
        let params = KdfParams::default();
        let k1 = derive_key("hunter2", &salt, &params).unwrap();
        let k2 = derive_key("hunter2", &salt, &params).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());

        let other_salt = Salt::random().unwrap();
        let k3 = derive_key("hunter2", &other_salt, &params).unwrap();
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let key = UserKey::generate().unwrap();
        assert_eq!(format!("{key:?}"), "UserKey(..)");
    }
}
