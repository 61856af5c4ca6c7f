use thiserror::Error;

/// Errors from remote session store operations.
///
/// Every variant is a distinct kind so callers can choose retry behaviour
/// with a `match`, never by inspecting messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested blob does not exist. Expected on first boot.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Transient network, auth-refresh, or backend failure. Eligible for retry.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Permission or quota failure. Needs operator attention; not retried.
    #[error("remote store rejected the request: {0}")]
    RemoteRejected(String),

    /// Malformed container or blob name.
    #[error("invalid blob reference: {0}")]
    InvalidRef(String),
}

impl StoreError {
    /// Returns `true` if the operation may succeed when retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }

    /// Returns `true` for the expected-absence case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classify a local I/O error the way a remote API would report it.
    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(context.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Self::RemoteRejected(format!("{context}: {err}"))
            }
            _ => Self::RemoteUnavailable(format!("{context}: {err}")),
        }
    }
}

impl From<tether_types::TypeError> for StoreError {
    fn from(err: tether_types::TypeError) -> Self {
        Self::InvalidRef(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::RemoteUnavailable("timeout".into()).is_transient());
        assert!(!StoreError::RemoteRejected("quota".into()).is_transient());
        assert!(!StoreError::NotFound("x".into()).is_transient());
        assert!(StoreError::NotFound("x".into()).is_not_found());
    }

    #[test]
    fn io_errors_classified_by_kind() {
        let e = StoreError::from_io("blob", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(e.is_not_found());
        let e = StoreError::from_io("blob", std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(e, StoreError::RemoteRejected(_)));
        let e = StoreError::from_io("blob", std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(e.is_transient());
    }
}
