//! Random key material.

use rand::RngCore;

/// Generate a random 4-word AES-128 key.
///
/// Uses the system's cryptographically secure random number generator.
///
/// # Example
/// ```
/// use megadl::crypto::make_random_key;
/// let a = make_random_key();
/// let b = make_random_key();
/// assert_ne!(a, b);
/// ```
pub fn make_random_key() -> [u32; 4] {
    let mut rng = rand::thread_rng();
    [rng.next_u32(), rng.next_u32(), rng.next_u32(), rng.next_u32()]
}
