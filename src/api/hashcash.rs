//! Proof-of-work answer to the `X-Hashcash` challenge.
//!
//! The challenge reads `"<version>:<easiness>:<ignored>:<token>"`. The solver
//! hashes a buffer made of a 4-byte counter followed by 262,144 copies of the
//! decoded token until the leading 32 bits of the SHA-256 digest fall under
//! the threshold derived from `easiness`.

use sha2::{Digest, Sha256};

use crate::base64::{base64url_decode, base64url_encode};
use crate::error::{MegaError, Result};

/// How many times the token is repeated after the counter prefix.
const TOKEN_REPEATS: usize = 0x40000;

/// A parsed version-1 challenge.
#[derive(Debug, Clone)]
pub struct HashcashChallenge {
    easiness: u32,
    token: String,
}

impl HashcashChallenge {
    /// Parse a raw header value.
    pub fn parse(header: &str) -> Result<Self> {
        let parts: Vec<&str> = header.splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(MegaError::Protocol(format!(
                "Malformed hashcash challenge '{}'",
                header
            )));
        }

        let version = parts[0].trim();
        if version != "1" {
            return Err(MegaError::Protocol(format!(
                "Hashcash challenge version is {} != 1",
                version
            )));
        }

        let easiness: u32 = parts[1].trim().parse().map_err(|_| {
            MegaError::Protocol(format!("Hashcash easiness is not numeric ('{}')", parts[1]))
        })?;

        Ok(Self {
            easiness,
            token: parts[3].trim().to_string(),
        })
    }

    /// Highest digest prefix accepted by the server.
    pub fn threshold(&self) -> u64 {
        let base = (((self.easiness & 63) << 1) | 1) as u64;
        let shifts = (self.easiness >> 6) * 7 + 3;
        base << shifts
    }

    /// Brute-force the counter. CPU bound: run it on a blocking thread.
    pub fn solve(&self) -> Result<String> {
        let token = base64url_decode(&self.token)?;
        if token.is_empty() {
            return Err(MegaError::Protocol("Empty hashcash token".to_string()));
        }

        let mut buffer = vec![0u8; 4 + TOKEN_REPEATS * token.len()];
        for slot in buffer[4..].chunks_exact_mut(token.len()) {
            slot.copy_from_slice(&token);
        }

        let threshold = self.threshold();
        loop {
            let digest = Sha256::digest(&buffer);
            let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
            if u64::from(head) <= threshold {
                return Ok(format!(
                    "1:{}:{}",
                    self.token,
                    base64url_encode(&buffer[..4])
                ));
            }

            // The prefix counts up as a little-endian integer.
            let counter = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
            buffer[..4].copy_from_slice(&counter.wrapping_add(1).to_le_bytes());
        }
    }
}

/// Solve a challenge header on tokio's blocking pool.
pub async fn solve_challenge(header: &str) -> Result<String> {
    let challenge = HashcashChallenge::parse(header)?;
    tokio::task::spawn_blocking(move || challenge.solve())
        .await
        .map_err(|e| MegaError::Custom(format!("Hashcash worker failed: {}", e)))?
}
