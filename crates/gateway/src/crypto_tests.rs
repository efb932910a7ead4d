use super::*;

#[test]
fn random_token_is_urlsafe_and_right_length() {
    let token = random_token(32).unwrap();
    // 32 raw bytes base64url-no-pad encode to 43 chars.
    assert_eq!(token.len(), 43);
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[test]
fn random_token_is_not_repeated() {
    let a = random_token(32).unwrap();
    let b = random_token(32).unwrap();
    assert_ne!(a, b);
}

#[test]
fn uuid_v4_has_expected_shape() {
    let id = uuid_v4();
    assert_eq!(id.len(), 36);
    assert_eq!(id.chars().filter(|c| *c == '-').count(), 4);
}

#[test]
fn constant_time_eq_matches_equal_strings() {
    assert!(constant_time_eq("secret-token", "secret-token"));
}

#[test]
fn constant_time_eq_rejects_mismatch() {
    assert!(!constant_time_eq("secret-token", "wrong-token!"));
    assert!(!constant_time_eq("short", "longer-string"));
    assert!(!constant_time_eq("", "x"));
}

#[test]
fn encrypt_then_decrypt_is_identity() {
    let plaintext = b"a stepwise archive, or at least some bytes standing in for one";
    let envelope = encrypt(plaintext, "correct horse battery staple").unwrap();
    let recovered = decrypt(&envelope, "correct horse battery staple").unwrap();
    assert_eq!(recovered, plaintext);
}

#[test]
fn decrypt_with_wrong_password_fails() {
    let envelope = encrypt(b"payload", "right-password").unwrap();
    let err = decrypt(&envelope, "wrong-password").unwrap_err();
    assert!(matches!(err, CryptoError::DecryptFailed));
}

#[test]
fn envelope_layout_matches_salt_iv_ciphertext_tag() {
    let plaintext = b"0123456789";
    let envelope = encrypt(plaintext, "pw").unwrap();
    // salt(32) + iv(12) + ciphertext(10) + tag(16)
    assert_eq!(envelope.len(), SALT_LEN + IV_LEN + plaintext.len() + TAG_LEN);
}

#[test]
fn decrypt_rejects_truncated_envelope() {
    let err = decrypt(&[0u8; 10], "pw").unwrap_err();
    assert!(matches!(err, CryptoError::EnvelopeTooShort));
}

#[test]
fn decrypt_rejects_corrupted_ciphertext() {
    let mut envelope = encrypt(b"payload", "pw").unwrap();
    let last = envelope.len() - 1;
    envelope[last] ^= 0xFF;
    let err = decrypt(&envelope, "pw").unwrap_err();
    assert!(matches!(err, CryptoError::DecryptFailed));
}
