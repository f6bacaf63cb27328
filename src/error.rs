//! Error types for the megadl library.

use thiserror::Error;

/// Main error type for megadl operations.
#[derive(Error, Debug)]
pub enum MegaError {
    /// The share URL matched none of the supported link shapes.
    #[error("Invalid link format: {0}")]
    Format(String),

    /// Anonymous login or session validation failed.
    #[error("Login failed: {0}")]
    Login(String),

    /// The server spoke the protocol in a way we cannot follow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// MEGA API returned an error code.
    #[error("API error: {code} - {message}")]
    ApiError { code: i64, message: String },

    /// Retry budget exhausted without a usable response.
    #[error("Unable to connect after {attempts} attempts")]
    Connection { attempts: u32 },

    /// Decrypted content does not match the node's meta MAC.
    #[error("Mismatched MAC (computed {computed:08x?} != expected {expected:08x?})")]
    Integrity {
        expected: [u32; 2],
        computed: [u32; 2],
    },

    /// The shared abort flag was raised.
    #[error("Operation aborted")]
    Aborted,

    /// HTTP request failed with status code.
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// Network request error.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl MegaError {
    /// Whether the protocol client may retry after this error.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, MegaError::RequestError(_) | MegaError::HttpError(_))
    }
}

/// Result type alias for megadl operations.
pub type Result<T> = std::result::Result<T, MegaError>;
