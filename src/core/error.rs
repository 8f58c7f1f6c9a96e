//! Error types for the storage core.
//!
//! Every store operation reports one of four error kinds: NotFound,
//! Conflict, Decode, or Backend. The protocol layer decides how each kind
//! becomes a protocol response; nothing in this crate produces a
//! user-facing message.

use thiserror::Error;

/// Storage core error conditions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row that the operation requires is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A certificate hash is bound to a different enrollment.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Stored bytes do not parse as the expected record shape.
    #[error("decode {what}: {message}")]
    Decode { what: String, message: String },

    /// The backend is unreachable or rejected the operation.
    #[error("backend: {message}")]
    Backend { message: String },

    /// The request deadline passed before the backend call was issued.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Caller-supplied bytes are malformed (certificate, payload).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// The four error kinds callers translate into protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Decode,
    Backend,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::Conflict => write!(f, "Conflict"),
            Self::Decode => write!(f, "Decode"),
            Self::Backend => write!(f, "Backend"),
        }
    }
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a Decode error for the named record or payload.
    pub fn decode(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Create a Backend error.
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: message.to_string(),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    /// Collapse this error onto one of the four reported kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Decode { .. } | Self::InvalidInput { .. } => ErrorKind::Decode,
            Self::Backend { .. } | Self::DeadlineExceeded => ErrorKind::Backend,
        }
    }

    /// Check if this error indicates the whole operation may be retried.
    ///
    /// Composite writes are not rolled back, so a Backend failure is always
    /// answered by repeating the entire operation.
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Backend
    }

    /// Check if this error reports an absent row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::backend(err)
    }
}

/// Result type using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(StoreError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(StoreError::decode("x", "bad").kind(), ErrorKind::Decode);
        assert_eq!(StoreError::invalid_input("bad").kind(), ErrorKind::Decode);
        assert_eq!(StoreError::DeadlineExceeded.kind(), ErrorKind::Backend);
    }

    #[test]
    fn only_backend_errors_retry() {
        assert!(StoreError::backend("down").is_retriable());
        assert!(StoreError::DeadlineExceeded.is_retriable());
        assert!(!StoreError::conflict("taken").is_retriable());
        assert!(!StoreError::decode("record", "bad").is_retriable());
    }

    #[test]
    fn display() {
        let err = StoreError::decode("TokenUpdate.plist", "missing Token");
        assert_eq!(err.to_string(), "decode TokenUpdate.plist: missing Token");
    }
}
