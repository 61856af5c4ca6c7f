use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("refusing to pack an empty credential set")]
    EmptyInput,

    #[error("invalid archive magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("truncated archive at offset {offset}: {reason}")]
    Truncated { offset: u64, reason: String },

    #[error("archive checksum mismatch")]
    ChecksumMismatch,

    #[error("CRC32 mismatch for entry {name}")]
    CrcMismatch { name: String },

    #[error("content version mismatch: header {expected}, decoded {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("invalid entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: String },

    #[error("duplicate entry in archive: {0}")]
    DuplicateEntry(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
