// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Symmetric encryption for stored OAuth tokens.
//!
//! AES-256-GCM under a single process-wide key. Each ciphertext is bound to
//! its owner through associated data, so a record copied onto another user
//! fails to decrypt. Output format: `base64(nonce || ciphertext || tag)`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use uuid::Uuid;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Cipher errors. `Decryption` means the key is wrong or the data is
/// corrupted, which is never the same thing as a missing credential.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption key must be exactly {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("encryption failed")]
    Encryption,

    #[error("ciphertext could not be authenticated (wrong key or corrupted data)")]
    Decryption,

    #[error("ciphertext is not valid base64")]
    Encoding,
}

/// Token encryption service.
#[derive(Clone)]
pub struct TokenCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Build the cipher from raw key bytes. Called once at startup.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }

        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt plaintext, binding it to `aad`.
    pub fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Encryption)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| CipherError::Encryption)?;

        let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&in_out);
        Ok(BASE64.encode(output))
    }

    /// Decrypt base64 ciphertext produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, CipherError> {
        let data = BASE64
            .decode(ciphertext_b64)
            .map_err(|_| CipherError::Encoding)?;

        if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CipherError::Decryption);
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CipherError::Decryption)?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Decryption)
    }
}

/// Associated data binding a token ciphertext to its owner.
pub fn user_aad(user_id: Uuid) -> Vec<u8> {
    format!("user_id:{}", user_id).into_bytes()
}

/// Helper to encrypt OAuth tokens before storing.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: Option<&str>,
    user_id: Uuid,
) -> Result<(String, Option<String>), CipherError> {
    let aad = user_aad(user_id);
    let encrypted_access = cipher.encrypt(access_token, &aad)?;
    let encrypted_refresh = refresh_token
        .map(|token| cipher.encrypt(token, &aad))
        .transpose()?;
    Ok((encrypted_access, encrypted_refresh))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> TokenCipher {
        TokenCipher::new(&[byte; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let cipher = cipher(1);
        let aad = user_aad(Uuid::new_v4());
        let long = "x".repeat(4096);

        for secret in ["", "a", "access-token-123", "ünïcødé ✓", long.as_str()] {
            let encrypted = cipher.encrypt(secret, &aad).unwrap();
            assert_ne!(encrypted, secret);
            assert_eq!(cipher.decrypt(&encrypted, &aad).unwrap(), secret);
        }
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let cipher = cipher(1);
        let aad = user_aad(Uuid::new_v4());
        let first = cipher.encrypt("same", &aad).unwrap();
        let second = cipher.encrypt("same", &aad).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails_with_decryption_error() {
        let aad = user_aad(Uuid::new_v4());
        let encrypted = cipher(1).encrypt("secret", &aad).unwrap();
        let result = cipher(2).decrypt(&encrypted, &aad);
        assert!(matches!(result, Err(CipherError::Decryption)));
    }

    #[test]
    fn test_wrong_owner_fails() {
        let cipher = cipher(1);
        let encrypted = cipher
            .encrypt("secret", &user_aad(Uuid::new_v4()))
            .unwrap();
        let result = cipher.decrypt(&encrypted, &user_aad(Uuid::new_v4()));
        assert!(matches!(result, Err(CipherError::Decryption)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher(1);
        let aad = user_aad(Uuid::new_v4());
        let encrypted = cipher.encrypt("secret", &aad).unwrap();

        let mut bytes = BASE64.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);

        assert!(matches!(
            cipher.decrypt(&tampered, &aad),
            Err(CipherError::Decryption)
        ));
        assert!(matches!(
            cipher.decrypt("AAAA", &aad),
            Err(CipherError::Decryption)
        ));
        assert!(matches!(
            cipher.decrypt("not base64!", &aad),
            Err(CipherError::Encoding)
        ));
    }

    #[test]
    fn test_key_length_is_validated() {
        assert!(matches!(
            TokenCipher::new(&[0u8; 16]),
            Err(CipherError::InvalidKeyLength(16))
        ));
        assert!(matches!(
            TokenCipher::new(&[0u8; 33]),
            Err(CipherError::InvalidKeyLength(33))
        ));
        assert!(TokenCipher::new(&[0u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn test_encrypt_tokens_without_refresh() {
        let cipher = cipher(3);
        let user_id = Uuid::new_v4();
        let (access, refresh) = encrypt_tokens(&cipher, "access", None, user_id).unwrap();
        assert!(refresh.is_none());
        assert_eq!(
            cipher.decrypt(&access, &user_aad(user_id)).unwrap(),
            "access"
        );
    }
}
