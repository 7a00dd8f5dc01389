use credvault_crypto::{
    decrypt_field, encrypt_field, generate_recovery_key, unwrap_user_key, wrap_user_key,
    CryptoError, FieldClass, KdfParams, UserKey, WrappedUserKey, KEY_SIZE,
};

fn params() -> KdfParams {
    KdfParams::default()
}

#[test]
fn wrap_unwrap_round_trip() {
    let recovery_key = generate_recovery_key().unwrap();
    let (user_key, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    let unwrapped = unwrap_user_key(
        &wrapped.encrypted_user_key,
        &recovery_key,
        &wrapped.kdf_salt,
        &params(),
    )
    .unwrap();

    assert_eq!(user_key.as_bytes(), unwrapped.as_bytes());
}

#[test]
fn wrapped_blob_has_three_hex_parts() {
    let recovery_key = generate_recovery_key().unwrap();
    let (_, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    let parts: Vec<&str> = wrapped.encrypted_user_key.split('.').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 24, "96-bit nonce");
    assert_eq!(parts[1].len(), KEY_SIZE * 2, "ciphertext of a 32-byte key");
    assert_eq!(parts[2].len(), 32, "128-bit tag");
    assert_eq!(wrapped.kdf_salt.len(), 32, "128-bit KDF salt");
}

#[test]
fn wrong_recovery_key_fails_authentication() {
    let recovery_key = generate_recovery_key().unwrap();
    let wrong = generate_recovery_key().unwrap();
    let (_, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    let result = unwrap_user_key(&wrapped.encrypted_user_key, &wrong, &wrapped.kdf_salt, &params());
    assert!(matches!(result, Err(CryptoError::Authentication)));
}

#[test]
fn flipping_any_byte_of_the_envelope_fails_authentication() {
    let recovery_key = generate_recovery_key().unwrap();
    let (_, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    let parts: Vec<&str> = wrapped.encrypted_user_key.split('.').collect();
    let decoded: Vec<Vec<u8>> = parts.iter().map(|p| hex::decode(p).unwrap()).collect();

    for (part_idx, part) in decoded.iter().enumerate() {
        for byte_idx in 0..part.len() {
            let mut tampered = decoded.clone();
            tampered[part_idx][byte_idx] ^= 0x01;
            let record = tampered
                .iter()
                .map(hex::encode)
                .collect::<Vec<_>>()
                .join(".");

            let result = unwrap_user_key(&record, &recovery_key, &wrapped.kdf_salt, &params());
            assert!(
                matches!(result, Err(CryptoError::Authentication)),
                "tampering part {part_idx} byte {byte_idx} must fail the tag check"
            );
        }
    }
}

#[test]
fn unparsable_envelope_is_a_format_error() {
    let recovery_key = generate_recovery_key().unwrap();
    let (_, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    for bad in ["", "onlyonepart", "two.parts", "a.b.c.d", "zz.zz.zz"] {
        let result = unwrap_user_key(bad, &recovery_key, &wrapped.kdf_salt, &params());
        assert!(matches!(result, Err(CryptoError::Format(_))), "{bad:?}");
    }
}

#[test]
fn each_wrap_produces_a_distinct_envelope_and_key() {
    let recovery_key = generate_recovery_key().unwrap();
    let (key_a, wrapped_a) = wrap_user_key(&recovery_key, &params()).unwrap();
    let (key_b, wrapped_b) = wrap_user_key(&recovery_key, &params()).unwrap();

    assert_ne!(key_a.as_bytes(), key_b.as_bytes());
    assert_ne!(wrapped_a.encrypted_user_key, wrapped_b.encrypted_user_key);
    assert_ne!(wrapped_a.kdf_salt, wrapped_b.kdf_salt);
}

#[test]
fn wrapped_key_serialization_round_trip() {
    let recovery_key = generate_recovery_key().unwrap();
    let (user_key, wrapped) = wrap_user_key(&recovery_key, &params()).unwrap();

    let json = serde_json::to_string(&wrapped).unwrap();
    let restored: WrappedUserKey = serde_json::from_str(&json).unwrap();

    let unwrapped = unwrap_user_key(
        &restored.encrypted_user_key,
        &recovery_key,
        &restored.kdf_salt,
        &params(),
    )
    .unwrap();
    assert_eq!(user_key.as_bytes(), unwrapped.as_bytes());
}

// Property-based tests; these avoid the KDF so they stay fast.
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn field_encryption_always_round_trips(text in ".*") {
            let key = UserKey::generate().unwrap();
            let record = encrypt_field(&text, &key, FieldClass::AppPassword).unwrap();
            prop_assert_ne!(&record, &text);
            let plain = decrypt_field(&record, &key, FieldClass::AppPassword).unwrap();
            prop_assert_eq!(plain, text);
        }

        #[test]
        fn field_decryption_with_wrong_key_always_fails(text in ".+") {
            let key = UserKey::generate().unwrap();
            let wrong = UserKey::generate().unwrap();
            let record = encrypt_field(&text, &key, FieldClass::AppPassword).unwrap();
            prop_assert!(matches!(
                decrypt_field(&record, &wrong, FieldClass::AppPassword),
                Err(CryptoError::Authentication)
            ));
        }
    }
}
