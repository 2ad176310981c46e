//! Error types for devctl
//!
//! Decode failures are kept apart from invocation failures: a `FormatError`
//! comes from a pure function over bytes and is always reproducible, while a
//! `DevCtlError` may also carry what the driver said.

use crate::codec::control_code::ControlCode;
use thiserror::Error;

/// Win32 `ERROR_JOURNAL_NOT_ACTIVE`
pub const ERROR_JOURNAL_NOT_ACTIVE: u32 = 1178;

/// Win32 `ERROR_JOURNAL_DELETE_IN_PROGRESS`
pub const ERROR_JOURNAL_DELETE_IN_PROGRESS: u32 = 1179;

/// Errors raised while decoding a driver buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Buffer truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown {family} variant tag {tag}")]
    UnknownVariant { family: &'static str, tag: u16 },

    #[error("{field} is not increasing: {previous} followed by {next}")]
    OutOfOrder {
        field: &'static str,
        previous: u64,
        next: u64,
    },
}

/// Main error type for devctl operations
#[derive(Error, Debug)]
pub enum DevCtlError {
    #[error("Malformed response: {0}")]
    Format(#[from] FormatError),

    #[error("DeviceIoControl({code}) failed with status {status}")]
    PlatformError { code: ControlCode, status: u32 },

    #[error(
        "Could not size output buffer for {code}: {attempts} attempts, last capacity {capacity}"
    )]
    SizeNegotiationFailed {
        code: ControlCode,
        attempts: usize,
        capacity: usize,
    },

    #[error("Enumeration stopped after {0} pages")]
    PageLimitExceeded(usize),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(#[from] serde_json::Error),

    #[error("Failed to open device '{0}': {1}")]
    VolumeOpenError(String, std::io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for devctl operations
pub type Result<T> = std::result::Result<T, DevCtlError>;

impl DevCtlError {
    /// Create a platform error from a raw status code
    pub fn from_win32(code: ControlCode, status: u32) -> Self {
        DevCtlError::PlatformError { code, status }
    }

    /// Raw status reported by the driver, if this error came from one
    pub fn platform_status(&self) -> Option<u32> {
        match self {
            DevCtlError::PlatformError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the change journal is missing or being deleted
    pub fn is_journal_not_active(&self) -> bool {
        matches!(
            self.platform_status(),
            Some(ERROR_JOURNAL_NOT_ACTIVE | ERROR_JOURNAL_DELETE_IN_PROGRESS)
        )
    }

    /// Check if the records gathered before this error are still usable
    ///
    /// Decode and paging failures leave earlier pages intact; a failed
    /// platform call may mean the volume changed under us.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DevCtlError::Format(FormatError::UnknownVariant { .. })
                | DevCtlError::PageLimitExceeded(_)
        )
    }
}
