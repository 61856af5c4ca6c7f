use std::fmt;

use crate::credential::ArchiveVersion;

/// An opaque, immutable packed credential state.
///
/// Archives are produced by the archive codec (with a known version) or read
/// back from the remote store (version unknown until decoded). They are moved
/// into exactly one upload or restore and never cached, so the type is
/// deliberately not `Clone`.
pub struct SessionArchive {
    bytes: Vec<u8>,
    version: Option<ArchiveVersion>,
}

impl SessionArchive {
    /// Wrap freshly packed bytes whose content version is known.
    pub fn new(bytes: Vec<u8>, version: ArchiveVersion) -> Self {
        Self {
            bytes,
            version: Some(version),
        }
    }

    /// Wrap bytes fetched from storage. The version is established on decode.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            version: None,
        }
    }

    /// Content version, if known.
    pub fn version(&self) -> Option<ArchiveVersion> {
        self.version
    }

    /// Raw archive bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the archive, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the archive has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SessionArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionArchive")
            .field("len", &self.bytes.len())
            .field("version", &self.version)
            .finish()
    }
}
