use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use patrimoine_core::{
    errors::{Error, ExternalError},
    secrets::SecretCipher,
    Result,
};

const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 cipher for credentials stored at rest.
///
/// Tokens are `base64(nonce || ciphertext)` with a fresh random nonce each time.
pub struct ChaChaSecretCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for ChaChaSecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaSecretCipher").finish_non_exhaustive()
    }
}

impl ChaChaSecretCipher {
    pub fn new(encryption_key: &str) -> Result<Self> {
        Ok(Self {
            key: decode_encryption_key(encryption_key)?,
        })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl SecretCipher for ChaChaSecretCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::Secret("Failed to encrypt secret".into()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(token))
    }

    fn decrypt(&self, token: &str) -> Result<String> {
        let raw = BASE64
            .decode(token.trim())
            .map_err(|e| ExternalError::Decrypt(format!("token is not base64: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(ExternalError::Decrypt("token is too short".into()).into());
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ExternalError::Decrypt("authentication failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| ExternalError::Decrypt("plaintext is not utf-8".into()).into())
    }
}

/// Cipher for the configured key, or `None` when no key is configured.
pub fn build_secret_cipher(encryption_key: Option<&str>) -> Result<Option<Arc<dyn SecretCipher>>> {
    match encryption_key {
        Some(value) if !value.trim().is_empty() => {
            let cipher: Arc<dyn SecretCipher> = Arc::new(ChaChaSecretCipher::new(value)?);
            Ok(Some(cipher))
        }
        _ => Ok(None),
    }
}

fn decode_encryption_key(raw: &str) -> Result<[u8; 32]> {
    let trimmed = raw.trim();
    let decoded = match BASE64.decode(trimmed) {
        Ok(bytes) => bytes,
        Err(_) if trimmed.len() == 32 => trimmed.as_bytes().to_vec(),
        Err(_) => {
            return Err(Error::Secret(
                "PATRIMOINE_SECRET_KEY must be a base64 string or 32-byte ascii value".into(),
            ))
        }
    };

    if decoded.len() != 32 {
        return Err(Error::Secret(
            "PATRIMOINE_SECRET_KEY must decode to exactly 32 bytes".into(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded);
    Ok(key)
}
