use std::path::{Path, PathBuf};

use tether_types::{CredentialState, SessionArchive};
use tracing::debug;

use crate::error::CodecResult;
use crate::format;
use crate::tree;

/// Default zstd level for archive entries.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Turns credential state into a [`SessionArchive`] and back.
///
/// Packing is lossless: every entry name and byte round-trips exactly.
/// Unpacking is all-or-nothing: the archive is fully decoded and verified in
/// memory, written to a staging directory, and only then swapped into place.
#[derive(Clone, Debug)]
pub struct ArchiveCodec {
    level: i32,
    staging_dir: Option<PathBuf>,
}

impl ArchiveCodec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            staging_dir: None,
        }
    }

    /// Set the zstd compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Stage extractions under `dir` instead of the destination's parent.
    /// `dir` must be on the same filesystem as every unpack destination.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Pack a credential state. Fails with [`CodecError::EmptyInput`] on an
    /// empty state.
    ///
    /// [`CodecError::EmptyInput`]: crate::CodecError::EmptyInput
    pub fn pack(&self, state: &CredentialState) -> CodecResult<SessionArchive> {
        let (bytes, version) = format::encode(state, self.level)?;
        debug!(files = state.len(), bytes = bytes.len(), version = %version.short_hex(), "packed session archive");
        Ok(SessionArchive::new(bytes, version))
    }

    /// Pack the credential directory at `dir`.
    pub fn pack_dir(&self, dir: &Path) -> CodecResult<SessionArchive> {
        let state = tree::read_tree(dir)?;
        self.pack(&state)
    }

    /// Decode and verify an archive without touching the filesystem.
    pub fn decode(&self, archive: &SessionArchive) -> CodecResult<CredentialState> {
        format::decode(archive.as_bytes())
    }

    /// Replace `dest` with the archive's contents, or leave it untouched on
    /// any error.
    pub fn unpack(&self, archive: SessionArchive, dest: &Path) -> CodecResult<CredentialState> {
        let state = self.decode(&archive)?;
        self.materialize(&state, dest)?;
        Ok(state)
    }

    /// Replace `dest` with exactly the files in `state`, via staging and swap.
    pub fn materialize(&self, state: &CredentialState, dest: &Path) -> CodecResult<()> {
        tree::materialize(state, dest, self.staging_dir.as_deref())
    }
}

impl Default for ArchiveCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn sample() -> CredentialState {
        CredentialState::new()
            .with_file("creds.json", br#"{"registered":true}"#.to_vec())
            .with_file("pre-key-1.json", vec![0u8; 256])
            .with_file("session-123@s.whatsapp.net.json", b"sess".to_vec())
    }

    #[test]
    fn pack_sets_version() {
        let codec = ArchiveCodec::new();
        let archive = codec.pack(&sample()).unwrap();
        assert_eq!(archive.version(), Some(sample().version()));
    }

    #[test]
    fn unpack_restores_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        let codec = ArchiveCodec::new();

        let archive = codec.pack(&sample()).unwrap();
        let restored = codec.unpack(archive, &dest).unwrap();

        assert_eq!(restored, sample());
        assert_eq!(
            std::fs::read(dest.join("creds.json")).unwrap(),
            br#"{"registered":true}"#
        );
    }

    #[test]
    fn corrupt_archive_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("creds.json"), b"current").unwrap();

        let codec = ArchiveCodec::new();
        let mut bytes = codec.pack(&sample()).unwrap().into_bytes();
        bytes.truncate(bytes.len() / 2);
        let err = codec
            .unpack(SessionArchive::from_bytes(bytes), &dest)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated { .. } | CodecError::ChecksumMismatch
        ));
        assert_eq!(std::fs::read(dest.join("creds.json")).unwrap(), b"current");
    }

    #[test]
    fn pack_dir_empty_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveCodec::new().pack_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CodecError::EmptyInput));
    }

    #[test]
    fn pack_dir_reads_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        std::fs::write(dir.path().join("creds.json"), b"c").unwrap();
        std::fs::write(dir.path().join("keys/k.json"), b"k").unwrap();

        let codec = ArchiveCodec::new();
        let archive = codec.pack_dir(dir.path()).unwrap();
        let state = codec.decode(&archive).unwrap();
        assert_eq!(state.get("keys/k.json"), Some(&b"k"[..]));
        assert_eq!(state.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn colon_and_backslash_names_survive_unpack() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("session-1:2@lid.json"), b"s").unwrap();
        std::fs::write(src.path().join("a\\b.json"), b"b").unwrap();

        let codec = ArchiveCodec::new();
        let archive = codec.pack_dir(src.path()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        let dest = dst.path().join("auth");
        let restored = codec.unpack(archive, &dest).unwrap();
        assert_eq!(restored.get("session-1:2@lid.json"), Some(&b"s"[..]));
        assert_eq!(std::fs::read(dest.join("a\\b.json")).unwrap(), b"b");
    }

    #[test]
    fn foreign_format_rejected() {
        let mut zip_like = b"PK\x03\x04".to_vec();
        zip_like.resize(128, b'.');
        let err = ArchiveCodec::new()
            .decode(&SessionArchive::from_bytes(zip_like))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidMagic { .. }));
    }

    #[test]
    fn compressible_content_shrinks() {
        let state = CredentialState::new().with_file("big.json", vec![b'a'; 100_000]);
        let archive = ArchiveCodec::new().pack(&state).unwrap();
        assert!(archive.len() < 10_000);
    }
}
