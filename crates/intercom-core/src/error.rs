//! Error types for the intercom channel.
//!
//! Transport problems are mostly non-fatal: an unavailable region or a torn
//! inbox degrade to "nothing happened this tick". Only an outbox overflow is
//! surfaced from `Channel::poll`.

use thiserror::Error;

/// Main error type for the intercom library.
#[derive(Debug, Error)]
pub enum IntercomError {
    // Shared memory errors
    #[error("Shared memory region {name} is unavailable: {source}")]
    RegionUnavailable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Access of {len} bytes at offset {offset} is outside region {region} ({capacity} bytes)")]
    OutOfBounds {
        region: String,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    // Wire format errors
    #[error("Framing error: {message}")]
    Framing { message: String },

    #[error("Batch of {size} bytes exceeds outbox capacity of {capacity} bytes")]
    Overflow { size: usize, capacity: usize },

    #[error("Invalid invocation: {message}")]
    InvalidInvocation { message: String },

    #[error("Codec error: {message}")]
    Codec { message: String },

    // Dispatch errors
    #[error("Arguments for {method} do not match: {message}")]
    ArgumentMismatch { method: String, message: String },

    #[error("Handler for {method} failed: {message}")]
    Handler { method: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for intercom operations.
pub type Result<T> = std::result::Result<T, IntercomError>;

impl From<std::io::Error> for IntercomError {
    fn from(err: std::io::Error) -> Self {
        IntercomError::RegionUnavailable {
            name: String::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for IntercomError {
    fn from(err: serde_json::Error) -> Self {
        IntercomError::Codec {
            message: err.to_string(),
        }
    }
}

impl IntercomError {
    /// Create a region error with the segment name attached.
    pub fn region(err: std::io::Error, name: impl Into<String>) -> Self {
        IntercomError::RegionUnavailable {
            name: name.into(),
            source: err,
        }
    }

    /// Shorthand for a framing error.
    pub fn framing(message: impl Into<String>) -> Self {
        IntercomError::Framing {
            message: message.into(),
        }
    }

    /// Check if the condition may clear up on a later poll.
    ///
    /// A peer that has not created its regions yet, or a batch that is still
    /// being written, both resolve themselves without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IntercomError::RegionUnavailable { .. } | IntercomError::Framing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IntercomError::Overflow {
            size: 20,
            capacity: 16,
        };
        assert_eq!(
            err.to_string(),
            "Batch of 20 bytes exceeds outbox capacity of 16 bytes"
        );
    }

    #[test]
    fn test_region_error_keeps_name() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = IntercomError::region(io, "chan.Foo");
        assert!(err.to_string().contains("chan.Foo"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(IntercomError::framing("short read").is_retryable());
        assert!(!IntercomError::Overflow {
            size: 2,
            capacity: 1
        }
        .is_retryable());
    }
}
