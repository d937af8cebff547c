//! Error types for the storage-configuration engine
//!
//! Two tiers of failure flow through this module: synchronous validation
//! errors, reported to the caller before any job is created, and
//! asynchronous execution errors, captured by a worker and stored on the
//! job as its terminal error.

use crate::redundancy::GoalMismatch;
use thiserror::Error;

/// Unified error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors (synchronous, no job is created)
    // =========================================================================
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("device not found: {path}")]
    DeviceNotFound { path: String },

    #[error("device {path} is not a {expected}")]
    WrongDeviceKind { path: String, expected: String },

    #[error("the goal does not match {context}: {mismatch}")]
    GoalUnsatisfied {
        context: String,
        mismatch: GoalMismatch,
    },

    #[error("at least {required} devices are required for {level}, got {actual}")]
    TooFewDevices {
        level: String,
        required: usize,
        actual: usize,
    },

    #[error("no RAID level matches the requested goal for the input devices")]
    NoMatchingLevel,

    // =========================================================================
    // Execution Errors (asynchronous, stored on the job)
    // =========================================================================
    #[error("device {path} disappeared")]
    DeviceDisappeared { path: String },

    #[error("backend operation failed: {operation}: {reason}")]
    BackendOperationFailed { operation: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Numeric error encodings surfaced at the management-protocol boundary.
///
/// The discriminants are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Failed = 1,
    InvalidParameter = 4,
    NotFound = 6,
    NotSupported = 7,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Error {
    /// Protocol error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidParameter(_) | Error::TooFewDevices { .. } => ErrorCode::InvalidParameter,
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::DeviceNotFound { .. } => ErrorCode::NotFound,
            Error::WrongDeviceKind { .. }
            | Error::GoalUnsatisfied { .. }
            | Error::NoMatchingLevel
            | Error::DeviceDisappeared { .. }
            | Error::BackendOperationFailed { .. }
            | Error::Internal(_) => ErrorCode::Failed,
        }
    }

    /// Whether this error belongs to the synchronous validation tier.
    ///
    /// Validation errors are reported to the caller directly and never
    /// appear as a job's terminal error.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Error::DeviceDisappeared { .. }
                | Error::BackendOperationFailed { .. }
                | Error::Internal(_)
        )
    }
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::InvalidParameter("bad size".into());
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
        assert_eq!(err.code().as_u16(), 4);

        let err = Error::NotSupported("rename".into());
        assert_eq!(err.code(), ErrorCode::NotSupported);
        assert_eq!(err.code().as_u16(), 7);

        let err = Error::DeviceNotFound {
            path: "/dev/sdz".into(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = Error::Internal("worker bug".into());
        assert_eq!(err.code(), ErrorCode::Failed);
        assert_eq!(err.code().as_u16(), 1);
    }

    #[test]
    fn test_validation_tier() {
        assert!(Error::InvalidParameter("x".into()).is_validation());
        assert!(Error::NoMatchingLevel.is_validation());
        assert!(Error::TooFewDevices {
            level: "RAID6".into(),
            required: 4,
            actual: 3
        }
        .is_validation());

        assert!(!Error::DeviceDisappeared {
            path: "/dev/sda".into()
        }
        .is_validation());
        assert!(!Error::Internal("panic".into()).is_validation());
    }
}
