//! Recovery key generation and verification.
//!
//! The recovery key is a high-entropy secret issued once at registration:
//! 24 symbols over `[A-Z0-9]` grouped as `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`
//! (~124 bits). It is shown to the user exactly once; the system retains
//! only the verification hash and the key-wrapping envelope derived from
//! it, so it can never be re-displayed.
//!
//! Verification hashing deliberately uses its own salt, independent of the
//! envelope's KDF salt, so a leaked verification hash does not expose the
//! wrapping key.

use crate::error::{CryptoError, CryptoResult};
use crate::key::KdfParams;
use crate::password::{hash_secret, verify_secret};
use rand::TryRngCore;

/// Alphabet the recovery key symbols are drawn from.
pub const RECOVERY_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of symbols in a recovery key (excluding hyphens).
pub const RECOVERY_KEY_SYMBOLS: usize = 24;

const GROUP_LEN: usize = 4;
const GROUPS: usize = RECOVERY_KEY_SYMBOLS / GROUP_LEN;

/// Generates a fresh recovery key from the OS CSPRNG.
pub fn generate_recovery_key() -> CryptoResult<String> {
    let mut bytes = [0u8; RECOVERY_KEY_SYMBOLS];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;

    let mut out = String::with_capacity(RECOVERY_KEY_SYMBOLS + GROUPS - 1);
    for group in 0..GROUPS {
        if group > 0 {
            out.push('-');
        }
        for i in 0..GROUP_LEN {
            let b = bytes[group * GROUP_LEN + i];
            out.push(RECOVERY_KEY_ALPHABET[b as usize % RECOVERY_KEY_ALPHABET.len()] as char);
        }
    }
    Ok(out)
}

/// Whether a string has the `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX` shape.
///
/// A format check only; it says nothing about whether the key is correct.
pub fn looks_like_recovery_key(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == GROUPS
        && groups.iter().all(|g| {
            g.len() == GROUP_LEN
                && g.bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}

/// Hashes a recovery key for storage verification.
pub fn hash_recovery_key(key: &str, params: &KdfParams) -> CryptoResult<String> {
    hash_secret(key, params)
}

/// Verifies a supplied recovery key against a stored hash record.
pub fn verify_recovery_key(key: &str, record: &str, params: &KdfParams) -> CryptoResult<bool> {
    verify_secret(key, record, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_key_matches_format() {
        for _ in 0..100 {
            let key = generate_recovery_key().unwrap();
            assert_eq!(key.len(), 29);
            assert!(looks_like_recovery_key(&key), "bad format: {key}");
        }
    }

    #[test]
    fn format_check_rejects_malformed_keys() {
        assert!(looks_like_recovery_key("ABCD-EF12-3456-7890-WXYZ-0000"));
        assert!(!looks_like_recovery_key(""));
        assert!(!looks_like_recovery_key("ABCD-EF12-3456-7890-WXYZ"));
        assert!(!looks_like_recovery_key("abcd-ef12-3456-7890-wxyz-0000"));
        assert!(!looks_like_recovery_key("ABCD-EF12-3456-7890-WXYZ-00000"));
        assert!(!looks_like_recovery_key("ABCD-EF12-3456-7890-WXYZ-00!0"));
    }

    #[test]
    fn no_collisions_across_ten_thousand_keys() {
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            assert!(seen.insert(generate_recovery_key().unwrap()));
        }
    }

    #[test]
    fn hash_verify_round_trip() {
        let params = KdfParams::default();
        let key = generate_recovery_key().unwrap();
        let record = hash_recovery_key(&key, &params).unwrap();

        assert!(verify_recovery_key(&key, &record, &params).unwrap());
        let other = generate_recovery_key().unwrap();
        assert!(!verify_recovery_key(&other, &record, &params).unwrap());
    }
}
