//! Driver status codes and errors.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Status codes a cluster driver can report.
///
/// This is the complete vocabulary the session layer interprets. A real wire
/// driver folds whatever its protocol speaks into these codes; everything
/// else about the protocol stays behind the driver seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// No coordinator could be reached at all.
    NetworkUnreachable,
    /// An established connection dropped mid-operation.
    ConnectionLost,
    /// The link (or a reference resolved through it) is not connected.
    NotConnected,
    /// The cluster rejected the supplied credentials.
    AuthenticationFailed,
    /// The named user does not exist.
    UserNotFound,
    /// The user exists but lacks permission.
    PermissionDenied,
    /// The cipher file backing token authentication is missing.
    CipherFileMissing,
    /// A request argument was malformed or empty.
    InvalidArgument,
    /// The namespace does not exist.
    NamespaceNotFound,
    /// The namespace already exists.
    NamespaceExists,
    /// The collection does not exist.
    CollectionNotFound,
    /// The collection already exists.
    CollectionExists,
    /// An index with this name and an identical definition already exists.
    IndexAlreadyDefined,
    /// An index with this name but a different definition already exists.
    IndexExists,
    /// The named index does not exist.
    IndexNotFound,
    /// The field already carries a conflicting auto-increment definition.
    AutoIncrementConflict,
    /// The field carries no auto-increment definition.
    AutoIncrementMissing,
    /// The cursor has no more documents.
    EndOfData,
    /// The operation was interrupted on the server.
    Interrupted,
    /// Any other server-side failure.
    ServerError,
}

impl StatusCode {
    /// Returns true for connectivity-loss codes, the only class the session
    /// layer is allowed to retry.
    #[must_use]
    pub fn is_network(self) -> bool {
        matches!(
            self,
            StatusCode::NetworkUnreachable | StatusCode::ConnectionLost | StatusCode::NotConnected
        )
    }

    /// Returns true for the credential-class codes that connect collapses
    /// into a single forbidden-access signal.
    #[must_use]
    pub fn is_credential(self) -> bool {
        matches!(
            self,
            StatusCode::AuthenticationFailed
                | StatusCode::UserNotFound
                | StatusCode::PermissionDenied
                | StatusCode::CipherFileMissing
        )
    }
}

/// An error reported by a cluster driver.
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct DriverError {
    code: StatusCode,
    message: String,
}

impl DriverError {
    /// Creates a driver error with the given status code.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a `ConnectionLost` error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ConnectionLost, message)
    }

    /// Creates a `NotConnected` error.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotConnected, message)
    }

    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    /// Creates an `EndOfData` error.
    pub fn end_of_data() -> Self {
        Self::new(StatusCode::EndOfData, "end of data")
    }

    /// The status code carried by this error.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// The human-readable detail message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand for `self.code().is_network()`.
    #[must_use]
    pub fn is_network(&self) -> bool {
        self.code.is_network()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_codes() {
        assert!(StatusCode::NetworkUnreachable.is_network());
        assert!(StatusCode::ConnectionLost.is_network());
        assert!(StatusCode::NotConnected.is_network());
        assert!(!StatusCode::CollectionExists.is_network());
        assert!(!StatusCode::ServerError.is_network());
    }

    #[test]
    fn credential_codes() {
        assert!(StatusCode::AuthenticationFailed.is_credential());
        assert!(StatusCode::UserNotFound.is_credential());
        assert!(StatusCode::PermissionDenied.is_credential());
        assert!(StatusCode::CipherFileMissing.is_credential());
        assert!(!StatusCode::NetworkUnreachable.is_credential());
    }

    #[test]
    fn error_accessors() {
        let err = DriverError::connection_lost("peer reset");
        assert_eq!(err.code(), StatusCode::ConnectionLost);
        assert!(err.is_network());
        assert!(err.to_string().contains("peer reset"));
    }
}
