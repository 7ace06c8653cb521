//! Result type definition and extension traits.
//!
//! The explorer degrades instead of failing: a provider that errors shows up
//! as an empty branch. These combinators keep that path free of
//! unwrap/expect while still leaving a trace in the log.

use crate::error::Error;

/// The standard Result type for heapscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logged fallbacks for Results.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;

    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, default: T) -> T;

    /// Map "not found" style errors to `Ok(None)`, keeping every other error.
    fn not_found_as_none(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed");
                None
            }
        }
    }

    fn or_default_logged(self, default: T) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed, using default");
                default
            }
        }
    }

    fn not_found_as_none(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Treating error as not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
