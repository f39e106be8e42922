//! Key derivation: PBKDF2-HMAC-SHA256 password → 256-bit key

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use zeroize::Zeroize;

use safearchive_core::{SaError, SaResult};

use crate::{KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};

/// Raw password bytes (UTF-8 text in practice). Zeroized on drop.
pub struct Password(SecretBox<[u8]>);

impl Password {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(SecretBox::new(bytes.into().into_boxed_slice()))
    }

    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// A 256-bit key derived from a password and salt.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters. Only the round count varies; hash and output length
/// are fixed at SHA-256 / 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
}

impl KdfParams {
    /// Upper bound accepted from envelope headers.
    pub const MAX_ITERATIONS: u32 = 10_000_000;

    pub fn new(iterations: u32) -> SaResult<Self> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> SaResult<()> {
        if self.iterations == 0 || self.iterations > Self::MAX_ITERATIONS {
            return Err(SaError::invalid(format!(
                "PBKDF2 iterations {} outside 1..={}",
                self.iterations,
                Self::MAX_ITERATIONS
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

/// Derive a 256-bit key from a password and a 16-byte salt.
///
/// Deterministic: the same (password, salt, params) always yields the same
/// key, which is how decryption re-derives it from the envelope's salt.
pub fn derive_key(
    password: &Password,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> SaResult<DerivedKey> {
    params.validate()?;

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.expose(), salt, params.iterations, &mut key);
    Ok(DerivedKey::from_bytes(key))
}

/// Fresh random salt; one per encryption, never reused.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
