//! MEGA API error codes.

/// MEGA API error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// Internal error
    Internal = -1,
    /// Invalid arguments
    Args = -2,
    /// Try again (transient congestion)
    Again = -3,
    /// Command weight quota exceeded
    RateLimit = -4,
    /// Upload failed
    Failed = -5,
    /// Too many concurrent IPs on the target URL
    TooMany = -6,
    /// Packet out of range
    Range = -7,
    /// Target URL expired
    Expired = -8,
    /// Object not found
    NotFound = -9,
    /// Circular linking
    Circular = -10,
    /// Access violation
    Access = -11,
    /// Resource already exists
    Exist = -12,
    /// Resource incomplete
    Incomplete = -13,
    /// Decryption failed
    Key = -14,
    /// Invalid or expired session
    Sid = -15,
    /// User blocked
    Blocked = -16,
    /// Over quota
    OverQuota = -17,
    /// Temporarily unavailable
    TempUnavail = -18,
    /// Too many connections
    TooManyConnections = -19,
    /// Write failed
    Write = -20,
    /// Read failed
    Read = -21,
    /// Invalid application key
    AppKey = -22,
    /// Any code not in the table
    Generic = -255,
}

impl From<i64> for ApiErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -1 => ApiErrorCode::Internal,
            -2 => ApiErrorCode::Args,
            -3 => ApiErrorCode::Again,
            -4 => ApiErrorCode::RateLimit,
            -5 => ApiErrorCode::Failed,
            -6 => ApiErrorCode::TooMany,
            -7 => ApiErrorCode::Range,
            -8 => ApiErrorCode::Expired,
            -9 => ApiErrorCode::NotFound,
            -10 => ApiErrorCode::Circular,
            -11 => ApiErrorCode::Access,
            -12 => ApiErrorCode::Exist,
            -13 => ApiErrorCode::Incomplete,
            -14 => ApiErrorCode::Key,
            -15 => ApiErrorCode::Sid,
            -16 => ApiErrorCode::Blocked,
            -17 => ApiErrorCode::OverQuota,
            -18 => ApiErrorCode::TempUnavail,
            -19 => ApiErrorCode::TooManyConnections,
            -20 => ApiErrorCode::Write,
            -21 => ApiErrorCode::Read,
            -22 => ApiErrorCode::AppKey,
            _ => ApiErrorCode::Generic,
        }
    }
}

impl ApiErrorCode {
    /// Protocol mnemonic, e.g. `EAGAIN`.
    pub fn name(&self) -> &'static str {
        match self {
            ApiErrorCode::Internal => "EINTERNAL",
            ApiErrorCode::Args => "EARGS",
            ApiErrorCode::Again => "EAGAIN",
            ApiErrorCode::RateLimit => "ERATELIMIT",
            ApiErrorCode::Failed => "EFAILED",
            ApiErrorCode::TooMany => "ETOOMANY",
            ApiErrorCode::Range => "ERANGE",
            ApiErrorCode::Expired => "EEXPIRED",
            ApiErrorCode::NotFound => "ENOENT",
            ApiErrorCode::Circular => "ECIRCULAR",
            ApiErrorCode::Access => "EACCESS",
            ApiErrorCode::Exist => "EEXIST",
            ApiErrorCode::Incomplete => "EINCOMPLETE",
            ApiErrorCode::Key => "EKEY",
            ApiErrorCode::Sid => "ESID",
            ApiErrorCode::Blocked => "EBLOCKED",
            ApiErrorCode::OverQuota => "EOVERQUOTA",
            ApiErrorCode::TempUnavail => "ETEMPUNAVAIL",
            ApiErrorCode::TooManyConnections => "ETOOMANYCONNECTIONS",
            ApiErrorCode::Write => "EWRITE",
            ApiErrorCode::Read => "EREAD",
            ApiErrorCode::AppKey => "EAPPKEY",
            ApiErrorCode::Generic => "EGENERIC",
        }
    }

    /// Get human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ApiErrorCode::Internal => "An internal error has occurred",
            ApiErrorCode::Args => "Invalid arguments passed to the command",
            ApiErrorCode::Again => "Temporary congestion or server malfunction, retry",
            ApiErrorCode::RateLimit => "Command weight per time quota exceeded",
            ApiErrorCode::Failed => "The upload failed",
            ApiErrorCode::TooMany => "Too many concurrent IP addresses on this target URL",
            ApiErrorCode::Range => "Packet out of range or not on a chunk boundary",
            ApiErrorCode::Expired => "The target URL has expired",
            ApiErrorCode::NotFound => "Object (typically, node or user) not found",
            ApiErrorCode::Circular => "Circular linkage attempted",
            ApiErrorCode::Access => "Access violation",
            ApiErrorCode::Exist => "Trying to create an object that already exists",
            ApiErrorCode::Incomplete => "Trying to access an incomplete resource",
            ApiErrorCode::Key => "A decryption operation failed",
            ApiErrorCode::Sid => "Invalid or expired user session",
            ApiErrorCode::Blocked => "User blocked",
            ApiErrorCode::OverQuota => "Request over quota",
            ApiErrorCode::TempUnavail => "Resource temporarily not available",
            ApiErrorCode::TooManyConnections => "Too many connections on this resource",
            ApiErrorCode::Write => "Write failed",
            ApiErrorCode::Read => "Read failed",
            ApiErrorCode::AppKey => "Invalid application key",
            ApiErrorCode::Generic => "Unknown error",
        }
    }

    /// Build the library error for a raw integer response code.
    pub fn to_error(code: i64) -> crate::error::MegaError {
        let known = ApiErrorCode::from(code);
        crate::error::MegaError::ApiError {
            code,
            message: format!("{}, {}", known.name(), known.description()),
        }
    }
}
