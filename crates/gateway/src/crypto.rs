//! Random IDs, session tokens, and the password-based archive envelope.
//!
//! Every random byte the gateway hands out — session ids, session tokens, the
//! PBKDF2 salt, the AES-GCM IV — comes from [`random_bytes`], so there is one
//! RNG entry point to audit. Constant-time comparison (`constant_time_eq`,
//! adapted from the reference gateway's `transport/auth.rs`) guards token
//! checks at the HTTP and WebSocket boundary.

use std::num::NonZeroU32;

use base64::Engine;
use ring::aead::{self, BoundKey};
use ring::rand::SecureRandom;

const SALT_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("decrypt failed")]
    DecryptFailed,
    #[error("buffer too short to contain a valid envelope")]
    EnvelopeTooShort,
    #[error("rng failure")]
    Rng,
}

fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let rng = ring::rand::SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf).map_err(|_| CryptoError::Rng)?;
    Ok(buf)
}

/// A random, URL-safe base64 token of `n` raw bytes. Used for both session
/// ids and session tokens — the two differ only in how the caller uses them,
/// not in how they're generated.
pub fn random_token(n: usize) -> Result<String, CryptoError> {
    let bytes = random_bytes(n)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// A random UUID v4, used for step and archive ids.
///
/// Built from [`random_bytes`] rather than `uuid::Uuid::new_v4()`'s own RNG,
/// so `ring::rand::SystemRandom` stays the one RNG this gateway draws from.
pub fn uuid_v4() -> String {
    match random_bytes(16) {
        Ok(bytes) => {
            let array: [u8; 16] = bytes.try_into().unwrap_or_default();
            uuid::Builder::from_random_bytes(array).into_uuid().to_string()
        }
        Err(_) => uuid::Uuid::new_v4().to_string(),
    }
}

/// Constant-time string equality, for comparing a presented token against the
/// expected one. Always compares the full length of both inputs so timing
/// does not leak a length-dependent or prefix-dependent signal.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

struct OneNonce(aead::Nonce);

impl aead::NonceSequence for OneNonce {
    fn advance(&mut self) -> Result<aead::Nonce, ring::error::Unspecified> {
        // SAFETY-relevant invariant, not a memory-safety one: each OneNonce is
        // used for exactly one seal/open call, so a single nonce is correct.
        let zero = aead::Nonce::assume_unique_for_key([0u8; IV_LEN]);
        Ok(std::mem::replace(&mut self.0, zero))
    }
}

#[allow(clippy::expect_used)] // PBKDF2_ITERATIONS is a fixed nonzero literal, never 0.
fn pbkdf2_iterations() -> NonZeroU32 {
    NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is nonzero")
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        pbkdf2_iterations(),
        salt,
        password.as_bytes(),
        &mut key,
    );
    key
}

/// Encrypt `plaintext` with `password`, producing the envelope defined by the
/// archive format: `salt(32) ‖ iv(12) ‖ ciphertext ‖ tag(16)`.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    let salt = random_bytes(SALT_LEN)?;
    let iv_bytes = random_bytes(IV_LEN)?;
    let key_bytes = derive_key(password, &salt);

    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &key_bytes)
        .map_err(|_| CryptoError::DecryptFailed)?;
    let nonce = aead::Nonce::try_assume_unique_for_key(&iv_bytes)
        .map_err(|_| CryptoError::DecryptFailed)?;
    let mut sealing = aead::SealingKey::new(unbound, OneNonce(nonce));

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptFailed)?;

    let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + in_out.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&iv_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt an envelope produced by [`encrypt`]. Any authentication, length,
/// or parse failure collapses to [`CryptoError::DecryptFailed`] — the caller
/// cannot and should not distinguish "wrong password" from "corrupt archive".
pub fn decrypt(envelope: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < SALT_LEN + IV_LEN + TAG_LEN {
        return Err(CryptoError::EnvelopeTooShort);
    }
    let (salt, rest) = envelope.split_at(SALT_LEN);
    let (iv_bytes, ciphertext) = rest.split_at(IV_LEN);

    let key_bytes = derive_key(password, salt);
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &key_bytes)
        .map_err(|_| CryptoError::DecryptFailed)?;
    let nonce = aead::Nonce::try_assume_unique_for_key(iv_bytes)
        .map_err(|_| CryptoError::DecryptFailed)?;
    let mut opening = aead::OpeningKey::new(unbound, OneNonce(nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptFailed)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
