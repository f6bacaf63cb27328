//! Streaming content decryptor with chained chunk MACs.
//!
//! Content is AES-128-CTR with the counter block `iv0 || iv1 || 0^64`. Every
//! chunk's plaintext is CBC-MACed with IV `(iv0, iv1, iv0, iv1)`, and each
//! chunk MAC is chained into the file MAC with one more block encryption.
//! Chunks must be fed in order and with the exact boundaries produced by
//! [`crate::fs::chunks::ChunkPlanner`].

use super::aes::{aes128_cbc_mac, aes128_ctr_apply, aes128_ecb_encrypt_block};
use super::keys::key_bytes;
use crate::base64::bytes_to_a32;
use crate::error::{MegaError, Result};

/// Decryption state for one file.
#[derive(Debug, Clone)]
pub struct StreamDecryptor {
    key: [u8; 16],
    nonce: [u8; 8],
    mac_iv: [u8; 16],
    mac_state: [u8; 16],
    expected: [u32; 2],
    position: u64,
}

impl StreamDecryptor {
    pub fn new(cipher_key: &[u32; 4], iv: &[u32; 4], meta_mac: &[u32; 2]) -> Self {
        let mut nonce = [0u8; 8];
        nonce[..4].copy_from_slice(&iv[0].to_be_bytes());
        nonce[4..].copy_from_slice(&iv[1].to_be_bytes());

        let mut mac_iv = [0u8; 16];
        mac_iv[..8].copy_from_slice(&nonce);
        mac_iv[8..].copy_from_slice(&nonce);

        Self {
            key: key_bytes(cipher_key),
            nonce,
            mac_iv,
            mac_state: [0u8; 16],
            expected: *meta_mac,
            position: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Decrypt the next chunk in place and fold it into the running MAC.
    ///
    /// The last block of a chunk is zero-padded, so an empty chunk still
    /// contributes one all-zero block.
    pub fn feed_in_place(&mut self, chunk: &mut [u8]) {
        aes128_ctr_apply(chunk, &self.key, &self.nonce, self.position);
        self.position += chunk.len() as u64;

        let chunk_mac = if chunk.is_empty() {
            aes128_cbc_mac(&[0u8; 16], &self.key, &self.mac_iv)
        } else {
            aes128_cbc_mac(chunk, &self.key, &self.mac_iv)
        };
        for i in 0..16 {
            self.mac_state[i] ^= chunk_mac[i];
        }
        self.mac_state = aes128_ecb_encrypt_block(&self.mac_state, &self.key);
    }

    /// Decrypt the next chunk and return the plaintext.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut plain = chunk.to_vec();
        self.feed_in_place(&mut plain);
        plain
    }

    /// MAC of everything fed so far, condensed to two words.
    pub fn condensed_mac(&self) -> [u32; 2] {
        let m = bytes_to_a32(&self.mac_state);
        [m[0] ^ m[1], m[2] ^ m[3]]
    }

    /// Compare the condensed MAC against the expected meta MAC.
    pub fn finish(self) -> Result<()> {
        let computed = self.condensed_mac();
        if computed != self.expected {
            return Err(MegaError::Integrity {
                expected: self.expected,
                computed,
            });
        }
        Ok(())
    }

    /// Drop the state without checking integrity.
    pub fn abort(self) {}
}
