//! Errors raised while framing and moving worker messages.

use std::io::ErrorKind;

use thiserror::Error;

/// Which half of a stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("frame of {actual_size} bytes exceeds the {max_size} byte limit")]
    MessageTooLarge { actual_size: usize, max_size: usize },

    /// The stream ended inside a frame, or before one when `bytes_read` is 0.
    #[error("stream ended after {bytes_read} of {expected_bytes} frame bytes")]
    UnexpectedEof {
        bytes_read: usize,
        expected_bytes: usize,
    },

    #[error("bad length prefix {length}: {reason}")]
    InvalidLength { length: u32, reason: String },

    #[error("cannot encode message: {cause}")]
    SerializationFailed { cause: String },

    /// Corrupt frame, or a payload decoded as the wrong type.
    #[error("cannot decode {payload_bytes} byte payload: {cause}")]
    DeserializationFailed { cause: String, payload_bytes: usize },

    #[error("stream {direction} failed: {kind:?}")]
    Io { direction: Direction, kind: ErrorKind },

    #[error("worker channel disconnected")]
    Disconnected,
}

impl TransportError {
    pub fn message_too_large(actual_size: usize, max_size: usize) -> Self {
        Self::MessageTooLarge {
            actual_size,
            max_size,
        }
    }

    pub fn unexpected_eof(bytes_read: usize, expected_bytes: usize) -> Self {
        Self::UnexpectedEof {
            bytes_read,
            expected_bytes,
        }
    }

    pub fn invalid_length(length: u32, reason: impl Into<String>) -> Self {
        Self::InvalidLength {
            length,
            reason: reason.into(),
        }
    }

    pub fn serialization_failed(cause: impl Into<String>) -> Self {
        Self::SerializationFailed {
            cause: cause.into(),
        }
    }

    pub fn deserialization_failed(cause: impl Into<String>, payload_bytes: usize) -> Self {
        Self::DeserializationFailed {
            cause: cause.into(),
            payload_bytes,
        }
    }

    pub fn write_failed(err: &std::io::Error) -> Self {
        Self::Io {
            direction: Direction::Write,
            kind: err.kind(),
        }
    }

    pub fn read_failed(err: &std::io::Error) -> Self {
        Self::Io {
            direction: Direction::Read,
            kind: err.kind(),
        }
    }

    /// Whether the peer went away cleanly between frames.
    pub const fn is_clean_close(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { bytes_read: 0, .. } | Self::Disconnected
        )
    }
}

impl From<TransportError> for heapscope_core::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected => Self::ChannelClosed,
            TransportError::SerializationFailed { cause } => Self::encode(cause),
            TransportError::DeserializationFailed { cause, .. } => Self::decode(cause),
            other => Self::transport(other.to_string()),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_frame() {
        let too_large = TransportError::message_too_large(17_000_000, 16 * 1024 * 1024);
        assert_eq!(
            too_large.to_string(),
            "frame of 17000000 bytes exceeds the 16777216 byte limit"
        );
        let truncated = TransportError::unexpected_eof(4, 36);
        assert_eq!(truncated.to_string(), "stream ended after 4 of 36 frame bytes");

        let io = std::io::Error::from(ErrorKind::BrokenPipe);
        assert_eq!(
            TransportError::write_failed(&io).to_string(),
            "stream write failed: BrokenPipe"
        );
    }

    #[test]
    fn test_conversion_into_core_error() {
        assert_eq!(
            heapscope_core::Error::from(TransportError::Disconnected),
            heapscope_core::Error::ChannelClosed
        );
        assert!(matches!(
            heapscope_core::Error::from(TransportError::deserialization_failed("x", 3)),
            heapscope_core::Error::Decode { .. }
        ));
        assert!(matches!(
            heapscope_core::Error::from(TransportError::invalid_length(0, "zero")),
            heapscope_core::Error::Transport { .. }
        ));
    }

    #[test]
    fn test_clean_close() {
        assert!(TransportError::unexpected_eof(0, 4).is_clean_close());
        assert!(!TransportError::unexpected_eof(4, 40).is_clean_close());
    }
}
