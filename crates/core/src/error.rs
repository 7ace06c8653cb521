//! Core error types for heapscope operations.
//!
//! All errors are explicit, typed, and recoverable - nothing in the explorer
//! is fatal to the process. A failure degrades to "this branch could not be
//! shown".

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for heapscope operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Range errors
    #[error("invalid items range [{start}, {end}) of {total}: {reason}")]
    InvalidRange {
        start: usize,
        end: usize,
        total: usize,
        reason: String,
    },

    #[error("total length changed from {expected} to {actual} within one sort epoch")]
    TotalLengthMismatch { expected: usize, actual: usize },

    // Remote call errors
    #[error("remote object {object_id} has been disposed")]
    HandleDisposed { object_id: u64 },

    #[error("call {call_id} to '{method}' was dropped without a result")]
    CallDropped { call_id: u64, method: String },

    #[error("channel to the worker is closed")]
    ChannelClosed,

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("failed to encode payload: {reason}")]
    Encode { reason: String },

    #[error("failed to decode payload: {reason}")]
    Decode { reason: String },

    // Worker-side errors
    #[error("remote object {object_id} not found")]
    ObjectNotFound { object_id: u64 },

    #[error("unknown method '{method}' on {target}")]
    UnknownMethod { target: String, method: String },

    #[error("unknown class '{class_name}'")]
    UnknownClass { class_name: String },

    #[error("snapshot parse error: {reason}")]
    SnapshotParse { reason: String },

    #[error("invalid search query: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    // Provider and tree errors
    #[error("provider has been disposed")]
    ProviderDisposed,

    #[error("tree node {node_id} not found")]
    NodeNotFound { node_id: u64 },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },
}

impl Error {
    /// Create an invalid range error.
    pub fn invalid_range(start: usize, end: usize, total: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            start,
            end,
            total,
            reason: reason.into(),
        }
    }

    /// Create a call dropped error.
    pub fn call_dropped(call_id: u64, method: impl Into<String>) -> Self {
        Self::CallDropped {
            call_id,
            method: method.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a payload encode error.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Create a payload decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create an unknown method error.
    pub fn unknown_method(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            target: target.into(),
            method: method.into(),
        }
    }

    /// Create an unknown class error.
    pub fn unknown_class(class_name: impl Into<String>) -> Self {
        Self::UnknownClass {
            class_name: class_name.into(),
        }
    }

    /// Create a snapshot parse error.
    pub fn snapshot_parse(reason: impl Into<String>) -> Self {
        Self::SnapshotParse {
            reason: reason.into(),
        }
    }

    /// Create an invalid search query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means "the thing asked for no longer exists".
    ///
    /// Callers treat these as an empty result rather than a failure.
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. }
                | Self::UnknownClass { .. }
                | Self::NodeNotFound { .. }
                | Self::HandleDisposed { .. }
                | Self::ProviderDisposed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_range(5, 3, 10, "start after end");
        assert_eq!(
            err.to_string(),
            "invalid items range [5, 3) of 10: start after end"
        );

        let err = Error::call_dropped(7, "serializeItemsRange");
        assert!(err.to_string().contains("serializeItemsRange"));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::unknown_class("Foo").is_not_found());
        assert!(Error::ObjectNotFound { object_id: 3 }.is_not_found());
        assert!(!Error::ChannelClosed.is_not_found());
        assert!(!Error::decode("bad").is_not_found());
    }
}
