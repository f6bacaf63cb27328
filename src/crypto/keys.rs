//! Key wrapping, file key folding and attribute decryption.
//!
//! Keys travel as arrays of big-endian 32-bit words. Wrapping is AES applied
//! independently to every 16-byte block (no chaining across blocks), while
//! attribute blobs are decrypted as one continuous zero-IV CBC stream.

use serde::{Deserialize, Serialize};

use super::aes::{aes128_cbc_decrypt, aes128_ecb_decrypt_block, aes128_ecb_encrypt_block};
use crate::base64::{a32_to_bytes, bytes_to_a32};
use crate::error::{MegaError, Result};

/// Name given to nodes whose attributes cannot be decrypted.
pub const UNKNOWN_OBJECT: &str = "Unknown Object";

/// Pack a 4-word key into AES key bytes.
pub fn key_bytes(key: &[u32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, word) in key.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Take exactly four words as a key.
pub fn to_key(words: &[u32]) -> Result<[u32; 4]> {
    words
        .try_into()
        .map_err(|_| MegaError::Protocol(format!("Expected a 4-word key, got {} words", words.len())))
}

fn map_blocks(data: &[u32], key: &[u32; 4], op: fn(&[u8; 16], &[u8; 16]) -> [u8; 16]) -> Result<Vec<u32>> {
    if data.len() % 4 != 0 {
        return Err(MegaError::Protocol(format!(
            "Key length {} is not a whole number of blocks",
            data.len()
        )));
    }

    let key = key_bytes(key);
    let mut out = Vec::with_capacity(data.len());
    for block in data.chunks_exact(4) {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&a32_to_bytes(block));
        out.extend(bytes_to_a32(&op(&bytes, &key)));
    }
    Ok(out)
}

/// Encrypt each 4-word block of `plain` under `key`.
pub fn wrap_key(plain: &[u32], key: &[u32; 4]) -> Result<Vec<u32>> {
    map_blocks(plain, key, aes128_ecb_encrypt_block)
}

/// Decrypt each 4-word block of `wrapped` under `key`.
pub fn unwrap_key(wrapped: &[u32], key: &[u32; 4]) -> Result<Vec<u32>> {
    map_blocks(wrapped, key, aes128_ecb_decrypt_block)
}

/// Components of an 8-word file key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileKey {
    pub cipher_key: [u32; 4],
    /// `(k4, k5, 0, 0)`; only the first two words seed the CTR counter.
    pub iv: [u32; 4],
    pub meta_mac: [u32; 2],
}

/// Split an 8-word file key into cipher key, IV and expected meta MAC.
pub fn fold_file_key(k: &[u32]) -> Result<FileKey> {
    if k.len() < 8 {
        return Err(MegaError::Protocol(format!(
            "File key has {} words, expected 8",
            k.len()
        )));
    }
    Ok(FileKey {
        cipher_key: [k[0] ^ k[4], k[1] ^ k[5], k[2] ^ k[6], k[3] ^ k[7]],
        iv: [k[4], k[5], 0, 0],
        meta_mac: [k[6], k[7]],
    })
}

/// Decrypted node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(rename = "n")]
    pub name: String,
}

impl Attributes {
    /// Placeholder for nodes without usable attributes.
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_OBJECT.to_string(),
        }
    }
}

/// Decrypt an attribute blob.
///
/// Anything that is not a `MEGA{...}` envelope yields the placeholder record.
pub fn decrypt_attributes(data: &[u8], key: &[u32; 4]) -> Attributes {
    if data.is_empty() || data.len() % 16 != 0 {
        return Attributes::unknown();
    }

    let plain = aes128_cbc_decrypt(data, &key_bytes(key));
    let text = match std::str::from_utf8(&plain) {
        Ok(s) => s.to_string(),
        // latin-1: every byte is its own code point
        Err(_) => plain.iter().map(|&b| b as char).collect(),
    };
    let text = text.trim_end_matches('\0');

    let Some(json) = text.strip_prefix("MEGA") else {
        return Attributes::unknown();
    };
    if !json.starts_with("{\"") {
        return Attributes::unknown();
    }

    if let Ok(attrs) = serde_json::from_str::<Attributes>(json) {
        return attrs;
    }
    // Trailing garbage after the object: cut at the first closing brace.
    json.find('}')
        .and_then(|end| serde_json::from_str::<Attributes>(&json[..=end]).ok())
        .unwrap_or_else(Attributes::unknown)
}

#[cfg(test)]
pub(crate) fn encrypt_attributes(attrs: &str, key: &[u32; 4]) -> Vec<u8> {
    use super::aes::aes128_ecb_encrypt_block as enc;

    let mut plain = format!("MEGA{}", attrs).into_bytes();
    while plain.len() % 16 != 0 {
        plain.push(0);
    }
    let key = key_bytes(key);
    let mut out = Vec::with_capacity(plain.len());
    let mut prev = [0u8; 16];
    for chunk in plain.chunks(16) {
        let mut block = [0u8; 16];
        for i in 0..16 {
            block[i] = chunk[i] ^ prev[i];
        }
        prev = enc(&block, &key);
        out.extend_from_slice(&prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u32; 4] = [0x01234567, 0x89abcdef, 0xfedcba98, 0x76543210];

    #[test]
    fn test_wrap_unwrap_identity() {
        let four = [1, 2, 3, 4];
        let eight = [10, 20, 30, 40, 50, 60, 70, 80];
        assert_eq!(unwrap_key(&wrap_key(&four, &KEY).unwrap(), &KEY).unwrap(), four);
        assert_eq!(unwrap_key(&wrap_key(&eight, &KEY).unwrap(), &KEY).unwrap(), eight);
    }

    #[test]
    fn test_wrap_blocks_are_independent() {
        let wrapped = wrap_key(&[7, 7, 7, 7, 7, 7, 7, 7], &KEY).unwrap();
        assert_eq!(wrapped[..4], wrapped[4..]);
    }

    #[test]
    fn test_unwrap_rejects_partial_block() {
        assert!(unwrap_key(&[1, 2, 3], &KEY).is_err());
    }

    #[test]
    fn test_fold_file_key() {
        let k = [1, 2, 3, 4, 0x10, 0x20, 0x30, 0x40];
        let folded = fold_file_key(&k).unwrap();
        assert_eq!(folded.cipher_key, [1 ^ 0x10, 2 ^ 0x20, 3 ^ 0x30, 4 ^ 0x40]);
        assert_eq!(folded.iv, [0x10, 0x20, 0, 0]);
        assert_eq!(folded.meta_mac, [0x30, 0x40]);
        assert!(fold_file_key(&k[..4]).is_err());
    }

    #[test]
    fn test_decrypt_attributes() {
        let blob = encrypt_attributes(r#"{"n":"holiday.jpg","c":"xyz"}"#, &KEY);
        let attrs = decrypt_attributes(&blob, &KEY);
        assert_eq!(attrs.name, "holiday.jpg");
    }

    #[test]
    fn test_wrong_key_gives_placeholder() {
        let blob = encrypt_attributes(r#"{"n":"secret.txt"}"#, &KEY);
        let attrs = decrypt_attributes(&blob, &[0, 0, 0, 1]);
        assert_eq!(attrs.name, UNKNOWN_OBJECT);
    }

    #[test]
    fn test_garbage_lengths_give_placeholder() {
        assert_eq!(decrypt_attributes(&[], &KEY).name, UNKNOWN_OBJECT);
        assert_eq!(decrypt_attributes(&[1, 2, 3], &KEY).name, UNKNOWN_OBJECT);
    }
}
