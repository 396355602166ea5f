//! Credential encryption contract.

use crate::errors::Result;

/// Symmetric cipher for secrets stored at rest.
///
/// `decrypt` fails with `ExternalError::Decrypt` when the token was tampered
/// with or was produced under another key.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, token: &str) -> Result<String>;
}
