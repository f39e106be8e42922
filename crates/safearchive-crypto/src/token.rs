//! Backend A: authenticated token cipher (Fernet token format)
//!
//! Envelope layout:
//! ```text
//! [16 bytes: salt][base64url( 0x80 || timestamp(8, BE) || iv(16) || AES-128-CBC ct || HMAC-SHA256(32) )]
//! ```
//! The 32-byte PBKDF2 key is base64url-encoded into a Fernet key: the first
//! half signs, the second half encrypts. Tokens are byte-compatible with the
//! `cryptography` package's Fernet, which produced the original `.zip.enc`
//! backups.

use aes::cipher::KeyInit;
use aes::Aes128;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use safearchive_core::{SaError, SaResult};

use crate::kdf::{derive_key, generate_salt, DerivedKey, KdfParams, Password};
use crate::{cbc, BLOCK_SIZE, KEY_SIZE, SALT_SIZE};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: u8 = 0x80;
const TIMESTAMP_LEN: usize = 8;
const HMAC_LEN: usize = 32;
/// version + timestamp + iv
const PREFIX_LEN: usize = 1 + TIMESTAMP_LEN + BLOCK_SIZE;

/// Split signing/encryption keys. Zeroized on drop.
pub struct FernetKey {
    signing: [u8; KEY_SIZE / 2],
    encryption: [u8; KEY_SIZE / 2],
}

impl FernetKey {
    /// Build from a PBKDF2 key by way of its base64url encoding, the form
    /// Fernet keys are exchanged in.
    pub fn from_derived(key: &DerivedKey) -> SaResult<Self> {
        let mut encoded = URL_SAFE.encode(key.as_bytes());
        let result = Self::from_base64(&encoded);
        encoded.zeroize();
        result
    }

    pub fn from_base64(encoded: &str) -> SaResult<Self> {
        let mut raw = URL_SAFE
            .decode(encoded.as_bytes())
            .map_err(|e| SaError::invalid(format!("fernet key is not base64url: {e}")))?;
        if raw.len() != KEY_SIZE {
            let len = raw.len();
            raw.zeroize();
            return Err(SaError::invalid(format!(
                "fernet key must decode to {KEY_SIZE} bytes, got {len}"
            )));
        }

        let mut signing = [0u8; KEY_SIZE / 2];
        let mut encryption = [0u8; KEY_SIZE / 2];
        signing.copy_from_slice(&raw[..KEY_SIZE / 2]);
        encryption.copy_from_slice(&raw[KEY_SIZE / 2..]);
        raw.zeroize();

        Ok(Self { signing, encryption })
    }

    fn mac(&self) -> SaResult<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.signing)
            .map_err(|e| SaError::invalid(format!("signing key rejected: {e}")))
    }

    /// Produce a base64url token for `plaintext`.
    pub fn seal(&self, plaintext: &[u8], iv: &[u8; BLOCK_SIZE], timestamp: u64) -> SaResult<String> {
        let cipher = Aes128::new((&self.encryption).into());
        let ciphertext = cbc::encrypt(&cipher, iv, &cbc::pad(plaintext));

        let mut body = Vec::with_capacity(PREFIX_LEN + ciphertext.len() + HMAC_LEN);
        body.push(TOKEN_VERSION);
        body.extend_from_slice(&timestamp.to_be_bytes());
        body.extend_from_slice(iv);
        body.extend_from_slice(&ciphertext);

        let mut mac = self.mac()?;
        mac.update(&body);
        body.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE.encode(body))
    }

    /// Verify and decrypt a token. Any defect (encoding, version, tag,
    /// padding) is reported as [`SaError::Authentication`] and no plaintext
    /// escapes before the tag has verified.
    pub fn open(&self, token: &[u8]) -> SaResult<Vec<u8>> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|_| SaError::Authentication)?;
        if raw.len() < PREFIX_LEN + BLOCK_SIZE + HMAC_LEN || raw[0] != TOKEN_VERSION {
            return Err(SaError::Authentication);
        }

        let (body, tag) = raw.split_at(raw.len() - HMAC_LEN);
        let mut mac = self.mac()?;
        mac.update(body);
        mac.verify_slice(tag).map_err(|_| SaError::Authentication)?;

        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&body[1 + TIMESTAMP_LEN..PREFIX_LEN]);
        let cipher = Aes128::new((&self.encryption).into());
        let padded =
            cbc::decrypt(&cipher, &iv, &body[PREFIX_LEN..]).ok_or(SaError::Authentication)?;

        cbc::unpad_strict(&padded)
            .map(<[u8]>::to_vec)
            .ok_or(SaError::Authentication)
    }
}

impl Drop for FernetKey {
    fn drop(&mut self) {
        self.signing.zeroize();
        self.encryption.zeroize();
    }
}

/// Encrypt a container: fresh salt, PBKDF2 key, Fernet token.
///
/// Returns `salt || token`.
pub fn encrypt(plaintext: &[u8], password: &Password, params: &KdfParams) -> SaResult<Vec<u8>> {
    let salt = generate_salt();
    let key = FernetKey::from_derived(&derive_key(password, &salt, params)?)?;

    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let token = key.seal(plaintext, &iv, timestamp)?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + token.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(token.as_bytes());
    Ok(envelope)
}

/// Decrypt `salt || token`. Fails with [`SaError::Authentication`] on a
/// wrong password or any corruption.
pub fn decrypt(envelope: &[u8], password: &Password, params: &KdfParams) -> SaResult<Vec<u8>> {
    if envelope.len() <= SALT_SIZE {
        return Err(SaError::Authentication);
    }
    let (salt_bytes, token) = envelope.split_at(SALT_SIZE);
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(salt_bytes);

    let key = FernetKey::from_derived(&derive_key(password, &salt, params)?)?;
    key.open(token)
}
