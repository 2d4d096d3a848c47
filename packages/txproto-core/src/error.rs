//! Centralized error taxonomy for the runtime.
//!
//! Synchronous API calls return [`TxResult`]; asynchronous worker failures
//! are instead dispatched as `ON_ERROR` events on the failing component's
//! event list (see [`crate::event`]) with the error attached as callback
//! data, per the propagation policy in the specification.

use thiserror::Error;

/// Trait for error types that provide a stable, machine-readable code.
///
/// Kept separate from `Display` (which is for humans) so callers that need
/// to match on error identity programmatically don't have to parse prose.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// The closed error taxonomy used throughout the runtime.
///
/// These are internal kinds, not type names borrowed from any particular
/// external media library — the runtime never assumes what underlying
/// codec/demux/mux implementation produced a given failure.
#[derive(Debug, Error)]
pub enum TxError {
    /// The underlying media or OS call failed; carries an opaque numeric
    /// code from that external call.
    #[error("external call failed with code {0}")]
    External(i32),

    /// The requested operation is not valid for this kind pair, or not
    /// valid on this platform.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Malformed options, a missing URI field, or an unknown codec name.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// A non-blocking FIFO operation could not complete immediately.
    #[error("would block")]
    WouldBlock,

    /// A requested device identifier was not enumerated.
    #[error("not found: {0}")]
    NotFound(String),

    /// A worker thread reached an unrecoverable state.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ErrorCode for TxError {
    fn code(&self) -> &'static str {
        match self {
            Self::External(_) => "external",
            Self::Unsupported(_) => "unsupported",
            Self::InvalidArg(_) => "invalid_arg",
            Self::NoMemory => "no_memory",
            Self::WouldBlock => "would_block",
            Self::NotFound(_) => "not_found",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Convenience alias for the runtime's fallible operations.
pub type TxResult<T> = Result<T, TxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(TxError::NoMemory.code(), "no_memory");
        assert_eq!(TxError::WouldBlock.code(), "would_block");
        assert_eq!(TxError::NotFound("x".into()).code(), "not_found");
    }

    #[test]
    fn display_includes_context() {
        let err = TxError::InvalidArg("missing url".into());
        assert!(err.to_string().contains("missing url"));
    }
}
