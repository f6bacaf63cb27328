//! AES-128 primitives.
//!
//! MEGA uses AES-128 in several modes:
//! - ECB: key wrapping and the login self-challenge
//! - CBC (zero IV): node attribute blobs
//! - CBC-MAC (custom IV): per-chunk content MACs
//! - CTR: file content

use aes::cipher::{
    generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher,
    StreamCipherSeek,
};
use aes::Aes128;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// AES-128-ECB encrypt a single 16-byte block.
pub fn aes128_ecb_encrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.encrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB decrypt a single 16-byte block.
pub fn aes128_ecb_decrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.decrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB encrypt multiple blocks.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(
        data.len() % 16 == 0,
        "Data length must be multiple of 16, got {}",
        data.len()
    );

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = data.to_vec();
    for chunk in result.chunks_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    result
}

/// AES-128-ECB decrypt multiple blocks.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(
        data.len() % 16 == 0,
        "Data length must be multiple of 16, got {}",
        data.len()
    );

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = data.to_vec();
    for chunk in result.chunks_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    result
}

/// AES-128-CBC decrypt multiple blocks with zero IV.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_cbc_decrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(
        data.len() % 16 == 0,
        "Data length must be multiple of 16, got {}",
        data.len()
    );

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = Vec::with_capacity(data.len());
    let mut iv = [0u8; 16];

    for chunk in data.chunks(16) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for i in 0..16 {
            block[i] ^= iv[i];
        }
        result.extend_from_slice(&block);
        iv.copy_from_slice(chunk);
    }

    result
}

/// CBC-MAC over `data` zero-padded to a whole block, starting from `iv`.
///
/// Returns the last ciphertext block. Empty input yields `iv` unchanged.
pub fn aes128_cbc_mac(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut state = GenericArray::clone_from_slice(iv);

    for chunk in data.chunks(16) {
        for (i, byte) in chunk.iter().enumerate() {
            state[i] ^= byte;
        }
        cipher.encrypt_block(&mut state);
    }

    state.into()
}

/// AES-128-CTR transform `data` in place, starting `offset` bytes into the
/// keystream. The counter block is `nonce || be64(block index)`.
pub fn aes128_ctr_apply(data: &mut [u8], key: &[u8; 16], nonce: &[u8; 8], offset: u64) {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(nonce);
    let mut cipher = Aes128Ctr::new(key.into(), &iv.into());
    cipher.seek(offset);
    cipher.apply_keystream(data);
}

/// AES-128-CTR decrypt a copy of `data` (see [`aes128_ctr_apply`]).
pub fn aes128_ctr_decrypt(data: &[u8], key: &[u8; 16], nonce: &[u8; 8], offset: u64) -> Vec<u8> {
    let mut out = data.to_vec();
    aes128_ctr_apply(&mut out, key, nonce, offset);
    out
}
