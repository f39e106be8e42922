//! Backend B: unauthenticated AES-256-CBC fallback.
//!
//! Layout: `salt(16) || iv(16) || ciphertext`. There is no integrity tag.
//! Decryption only checks that the final byte is a plausible pad length, so
//! roughly one wrong password in sixteen yields garbage instead of an error.
//! Envelopes written this way cannot be told apart from corrupted ones.

use aes::cipher::KeyInit;
use aes::Aes256;
use rand::RngCore;

use safearchive_core::{SaError, SaResult};

use crate::kdf::{derive_key, generate_salt, KdfParams, Password};
use crate::{cbc, BLOCK_SIZE, SALT_SIZE};

/// PKCS#7 pad. Aligned input gains a whole 16-byte block.
pub fn pad(data: &[u8]) -> Vec<u8> {
    cbc::pad(data)
}

/// Strip padding by trusting the last byte, provided it lies in `1..=16`.
///
/// The pad bytes themselves are not compared; older backups were written
/// and read this way.
pub fn unpad(data: &[u8]) -> SaResult<&[u8]> {
    let pad_len = *data.last().ok_or(SaError::Padding)? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return Err(SaError::Padding);
    }
    Ok(&data[..data.len() - pad_len])
}

pub fn encrypt(plaintext: &[u8], password: &Password, params: &KdfParams) -> SaResult<Vec<u8>> {
    let salt = generate_salt();
    let key = derive_key(password, &salt, params)?;

    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256::new(key.as_bytes().into());
    let ciphertext = cbc::encrypt(&cipher, &iv, &pad(plaintext));

    let mut envelope = Vec::with_capacity(SALT_SIZE + BLOCK_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt `salt || iv || ciphertext`.
///
/// A short or misaligned envelope and an implausible pad byte both surface
/// as [`SaError::Padding`].
pub fn decrypt(envelope: &[u8], password: &Password, params: &KdfParams) -> SaResult<Vec<u8>> {
    if envelope.len() < SALT_SIZE + BLOCK_SIZE + BLOCK_SIZE {
        return Err(SaError::Padding);
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&envelope[..SALT_SIZE]);
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&envelope[SALT_SIZE..SALT_SIZE + BLOCK_SIZE]);
    let ciphertext = &envelope[SALT_SIZE + BLOCK_SIZE..];

    let key = derive_key(password, &salt, params)?;
    let cipher = Aes256::new(key.as_bytes().into());
    let padded = cbc::decrypt(&cipher, &iv, ciphertext).ok_or(SaError::Padding)?;

    unpad(&padded).map(<[u8]>::to_vec)
}
