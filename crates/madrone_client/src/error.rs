//! Unified error taxonomy for the session layer.

use madrone_driver::{DriverError, StatusCode};
use thiserror::Error;

/// Result type for session-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fixed message for every credential or authority failure, so callers
/// cannot distinguish a bad user from a bad password or a missing cipher
/// file.
pub const AUTH_FORBIDDEN: &str = "authentication failed or access denied";

/// Errors surfaced by the session layer.
///
/// Raw driver status codes never cross this boundary; [`Error::from_driver`]
/// folds them into these kinds exactly once, at the point an operation gives
/// up.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input: address strings, names, option documents.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was malformed.
        message: String,
    },

    /// Connectivity loss. The only kind the retry wrapper recovers from.
    #[error("network error: {message}")]
    Network {
        /// Driver detail, preserved for diagnostics.
        message: String,
    },

    /// Credential or authority failure, collapsed to a fixed message.
    #[error("{message}")]
    Authentication {
        /// Always [`AUTH_FORBIDDEN`].
        message: String,
    },

    /// The cluster does not support the requested operation.
    #[error("not allowed: {message}")]
    NotAllowed {
        /// What was requested.
        message: String,
    },

    /// A namespace, collection or index lookup found nothing to act on.
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// A lifecycle conflict that reconciliation could not absorb.
    #[error("conflict: {message}")]
    Conflict {
        /// The conflicting definition.
        message: String,
    },

    /// A cursor was exhausted where a document was required.
    #[error("end of data")]
    EndOfData,

    /// Unexpected server response shape or other internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl Error {
    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a `Network` error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates the single fixed-message `Authentication` error.
    #[must_use]
    pub fn authentication() -> Self {
        Self::Authentication {
            message: AUTH_FORBIDDEN.to_string(),
        }
    }

    /// Creates a `NotAllowed` error.
    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::NotAllowed {
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a `Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this is a connectivity failure.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Whether this is the exhausted-cursor condition.
    #[must_use]
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData)
    }

    /// Whether this reports something missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Maps a driver failure into the session taxonomy.
    #[must_use]
    pub fn from_driver(err: DriverError) -> Self {
        let code = err.code();
        let message = err.message().to_string();
        match code {
            StatusCode::InvalidArgument => Self::InvalidArgument { message },
            StatusCode::NetworkUnreachable
            | StatusCode::ConnectionLost
            | StatusCode::NotConnected => Self::Network { message },
            StatusCode::AuthenticationFailed
            | StatusCode::UserNotFound
            | StatusCode::PermissionDenied
            | StatusCode::CipherFileMissing => Self::authentication(),
            StatusCode::NamespaceNotFound
            | StatusCode::CollectionNotFound
            | StatusCode::IndexNotFound
            | StatusCode::AutoIncrementMissing => Self::NotFound { message },
            StatusCode::NamespaceExists
            | StatusCode::CollectionExists
            | StatusCode::IndexAlreadyDefined
            | StatusCode::IndexExists
            | StatusCode::AutoIncrementConflict => Self::Conflict { message },
            StatusCode::EndOfData => Self::EndOfData,
            StatusCode::Interrupted | StatusCode::ServerError => Self::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use madrone_driver::DriverError;

    #[test]
    fn display_formats() {
        assert_eq!(
            Error::invalid_argument("empty name").to_string(),
            "invalid argument: empty name"
        );
        assert_eq!(Error::authentication().to_string(), AUTH_FORBIDDEN);
        assert_eq!(Error::EndOfData.to_string(), "end of data");
    }

    #[test]
    fn driver_mapping_collapses_credentials() {
        for code in [
            StatusCode::AuthenticationFailed,
            StatusCode::UserNotFound,
            StatusCode::PermissionDenied,
            StatusCode::CipherFileMissing,
        ] {
            let err = Error::from_driver(DriverError::new(code, "detail"));
            assert_eq!(err.to_string(), AUTH_FORBIDDEN);
        }
    }

    #[test]
    fn driver_mapping_preserves_classes() {
        let err = Error::from_driver(DriverError::connection_lost("socket reset"));
        assert!(err.is_network());

        let err = Error::from_driver(DriverError::new(
            StatusCode::CollectionNotFound,
            "no such collection",
        ));
        assert!(err.is_not_found());

        let err = Error::from_driver(DriverError::new(StatusCode::IndexExists, "ix"));
        assert!(matches!(err, Error::Conflict { .. }));

        let err = Error::from_driver(DriverError::end_of_data());
        assert!(err.is_end_of_data());
    }
}
