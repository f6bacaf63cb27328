//! Cryptographic operations for the MEGA protocol.

pub mod aes;
pub mod decryptor;
pub mod keys;
pub mod random;

pub use self::aes::*;
pub use decryptor::StreamDecryptor;
pub use keys::*;
pub use random::*;
