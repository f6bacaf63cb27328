//! MEGA API client and types.

pub mod client;
pub mod error;
pub mod hashcash;

pub use client::ApiClient;
pub use error::ApiErrorCode;
