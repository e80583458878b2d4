//! Mirror error model with stable error codes
//!
//! Defines a typed error hierarchy using `thiserror`. Transport failures keep
//! their own type so callers can tell a dead connection apart from a session
//! that is merely busy.

use thiserror::Error;

/// Failure reported by the transport collaborator
///
/// The mirror never inspects these beyond classification; the original
/// message is preserved for the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the server
    #[error("connection failed: {0}")]
    Connection(String),
    /// Socket-level read/write failure
    #[error("I/O failure: {0}")]
    Io(String),
    /// TLS negotiation or certificate failure
    #[error("SSL failure: {0}")]
    Ssl(String),
    /// Server answered with a fault
    #[error("server fault {code}: {message}")]
    Fault { code: String, message: String },
}

impl TransportError {
    /// Fault code reported when the caller lacks rights on the target
    pub const PERM_DENIED: &'static str = "service.PERM_DENIED";

    /// Whether this is a server fault with the given code
    pub fn is_fault(&self, code: &str) -> bool {
        matches!(self, Self::Fault { code: c, .. } if c == code)
    }
}

/// Mirror error type
///
/// Covers every failure a session operation can surface. Malformed
/// notification records are not errors: they are logged and skipped.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Invalid caller input (bad id, bad path, bad configuration value)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested entity is not part of the mirror
    #[error("not found: {0}")]
    NotFound(String),
    /// Server payload could not be interpreted (refresh, fetch response)
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// Remote call failed; the mirror is left unchanged
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// Session lock not acquired within the configured timeout
    #[error("lock timeout: {0}")]
    LockTimeout(String),
    /// Too many callers already waiting on the session lock
    #[error("lock contention: {0}")]
    LockContention(String),
    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `Malformed`
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Stable machine-readable code
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_input`
    /// - `NotFound` → `not_found`
    /// - `Malformed` → `malformed`
    /// - `Transport` → `transport`
    /// - `LockTimeout` → `lock_timeout`
    /// - `LockContention` → `lock_contention`
    /// - `Internal` → `internal`
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
            Self::Transport(_) => "transport",
            Self::LockTimeout(_) => "lock_timeout",
            Self::LockContention(_) => "lock_contention",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the failure came from the session lock rather than the server
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::LockContention(_))
    }
}

/// Type alias for fallible return values
pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::{MirrorError, TransportError};

    #[test]
    fn transport_errors_convert_and_keep_their_code() {
        let err: MirrorError = TransportError::Io("reset by peer".to_owned()).into();
        assert_eq!(err.code(), "transport");
        assert!(!err.is_lock_failure());
        assert!(err.to_string().contains("reset by peer"));
    }

    #[test]
    fn lock_failures_are_distinguishable() {
        assert!(MirrorError::LockTimeout("60000ms".to_owned()).is_lock_failure());
        assert!(MirrorError::LockContention("15 waiting".to_owned()).is_lock_failure());
        assert_eq!(
            MirrorError::LockTimeout(String::new()).code(),
            "lock_timeout"
        );
    }

    #[test]
    fn fault_code_matching() {
        let fault = TransportError::Fault {
            code: TransportError::PERM_DENIED.to_owned(),
            message: "no".to_owned(),
        };
        assert!(fault.is_fault(TransportError::PERM_DENIED));
        assert!(!TransportError::Ssl("x".to_owned()).is_fault(TransportError::PERM_DENIED));
    }
}
