use thiserror::Error;

use tether_archive::CodecError;
use tether_creds::CredsError;
use tether_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Codec(#[from] CodecError),

    #[error("credential repository error: {0}")]
    Creds(#[from] CredsError),

    /// Restoring from the remote failed; local credentials were left as is.
    #[error("hydration failed: {0}")]
    HydrationFailed(#[source] Box<SyncError>),

    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether retrying at the next trigger may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::HydrationFailed(inner) => inner.is_transient(),
            Self::Task(_) => true,
            Self::Codec(_) | Self::Creds(_) => false,
        }
    }

    /// The remote refused the operation (permission, quota).
    pub fn is_rejected(&self) -> bool {
        match self {
            Self::Store(e) => matches!(e, StoreError::RemoteRejected(_)),
            Self::HydrationFailed(inner) => inner.is_rejected(),
            _ => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
