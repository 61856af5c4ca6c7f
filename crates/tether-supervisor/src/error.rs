use thiserror::Error;

use tether_creds::CredsError;
use tether_sync::SyncError;
use tether_types::TypeError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid state transition: {0}")]
    Transition(#[from] TypeError),

    #[error("credential repository error: {0}")]
    Creds(#[from] CredsError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("invalid supervisor config: {0}")]
    InvalidConfig(String),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
