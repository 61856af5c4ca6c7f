use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredsError {
    #[error("invalid credential name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] tether_archive::CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CredsResult<T> = Result<T, CredsError>;
