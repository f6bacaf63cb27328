//! MEGA-style URL-safe base64 and 32-bit word packing.
//!
//! MEGA uses a variant of base64 that:
//! - Replaces `+` with `-`
//! - Replaces `/` with `_`
//! - Removes padding `=` characters
//!
//! Keys, IVs and MACs travel as sequences of big-endian `u32` words
//! ("a32" arrays); the helpers here convert between those and bytes.

use base64::{engine::general_purpose, Engine};

/// Encode bytes to MEGA's URL-safe base64 (no padding).
///
/// # Example
/// ```
/// use megadl::base64::base64url_encode;
/// let encoded = base64url_encode(b"hello");
/// assert!(!encoded.contains('='));
/// assert!(!encoded.contains('+'));
/// assert!(!encoded.contains('/'));
/// ```
pub fn base64url_encode(data: &[u8]) -> String {
    let encoded = general_purpose::STANDARD.encode(data);
    encoded
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string()
}

/// Decode MEGA's URL-safe base64 to bytes.
///
/// Stray commas (seen in some server payloads) are ignored.
///
/// # Example
/// ```
/// use megadl::base64::{base64url_encode, base64url_decode};
/// let original = b"hello world";
/// let encoded = base64url_encode(original);
/// let decoded = base64url_decode(&encoded).unwrap();
/// assert_eq!(decoded, original);
/// ```
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let standard: String = s
        .chars()
        .filter(|c| *c != ',')
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let standard = standard.trim_end_matches('=');

    // Add padding if needed (base64 requires length to be multiple of 4)
    let padding = (4 - (standard.len() % 4)) % 4;
    let padded = format!("{}{}", standard, "=".repeat(padding));

    general_purpose::STANDARD.decode(&padded)
}

/// Pack 32-bit words into big-endian bytes.
pub fn a32_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Unpack big-endian bytes into 32-bit words, zero-padding the tail to a
/// whole word.
pub fn bytes_to_a32(data: &[u8]) -> Vec<u32> {
    data.chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

/// Decode a base64 string straight into 32-bit words.
pub fn base64_to_a32(s: &str) -> Result<Vec<u32>, base64::DecodeError> {
    Ok(bytes_to_a32(&base64url_decode(s)?))
}

/// Encode 32-bit words as MEGA base64.
pub fn a32_to_base64(words: &[u32]) -> String {
    base64url_encode(&a32_to_bytes(words))
}
