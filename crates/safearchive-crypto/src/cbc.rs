//! CBC chaining and PKCS#7 padding over a 128-bit block cipher.
//!
//! Shared by the token cipher (AES-128) and the block fallback (AES-256).

use aes::cipher::consts::U16;
use aes::cipher::{BlockDecrypt, BlockEncrypt, BlockSizeUser};
use aes::Block;

use crate::BLOCK_SIZE;

/// Append PKCS#7 padding. Always adds 1..=16 bytes, a full block when the
/// input is already aligned.
pub(crate) fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

/// Full PKCS#7 check: every pad byte must equal the pad length.
pub(crate) fn unpad_strict(data: &[u8]) -> Option<&[u8]> {
    let pad_len = *data.last()? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return None;
    }
    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().all(|&b| b as usize == pad_len) {
        Some(body)
    } else {
        None
    }
}

/// CBC-encrypt already padded plaintext.
pub(crate) fn encrypt<C>(cipher: &C, iv: &[u8; BLOCK_SIZE], padded: &[u8]) -> Vec<u8>
where
    C: BlockEncrypt + BlockSizeUser<BlockSize = U16>,
{
    debug_assert_eq!(padded.len() % BLOCK_SIZE, 0);

    let mut out = Vec::with_capacity(padded.len());
    let mut prev = *iv;
    for chunk in padded.chunks_exact(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
        prev.copy_from_slice(&block);
    }
    out
}

/// CBC-decrypt; returns `None` when the ciphertext is empty or not block
/// aligned. Padding is left in place for the caller to judge.
pub(crate) fn decrypt<C>(cipher: &C, iv: &[u8; BLOCK_SIZE], ciphertext: &[u8]) -> Option<Vec<u8>>
where
    C: BlockDecrypt + BlockSizeUser<BlockSize = U16>,
{
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return None;
    }

    let mut out = Vec::with_capacity(ciphertext.len());
    let mut prev = *iv;
    for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        out.extend_from_slice(&block);
        prev.copy_from_slice(chunk);
    }
    Some(out)
}
