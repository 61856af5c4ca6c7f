use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tether_archive::{names, read_tree, write_file_atomic, ArchiveCodec, CodecError};
use tether_types::CredentialState;
use tracing::{debug, info};

use crate::error::{CredsError, CredsResult};
use crate::mutation::{CredentialMutation, MutationHub, MutationKind, MutationStream};
use crate::traits::CredentialRepository;

/// Credential repository backed by a directory of files.
///
/// File names are `/`-separated paths relative to `root`. Single files are
/// replaced via temp file + rename; whole-set replacement stages a new tree
/// and swaps it in.
#[derive(Debug)]
pub struct FsCredentialRepository {
    root: PathBuf,
    codec: ArchiveCodec,
    hub: MutationHub,
    write_lock: Mutex<()>,
}

impl FsCredentialRepository {
    /// Open (without creating) the credential directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_codec(root, ArchiveCodec::new())
    }

    /// Use `codec` for staged replacement (e.g. to set a staging directory).
    pub fn with_codec(root: impl Into<PathBuf>, codec: ArchiveCodec) -> Self {
        Self {
            root: root.into(),
            codec,
            hub: MutationHub::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checked_path(&self, name: &str) -> CredsResult<PathBuf> {
        names::validate_entry_name(name).map_err(|e| match e {
            CodecError::InvalidEntryName { name, reason } => CredsError::InvalidName { name, reason },
            other => CredsError::Codec(other),
        })?;
        Ok(name.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }
}

impl CredentialRepository for FsCredentialRepository {
    fn snapshot(&self) -> CredsResult<CredentialState> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        Ok(read_tree(&self.root)?)
    }

    fn replace(&self, state: &CredentialState) -> CredsResult<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        self.codec.materialize(state, &self.root)?;
        info!(root = %self.root.display(), files = state.len(), "credential directory replaced");
        Ok(())
    }

    fn store_entry(&self, name: &str, content: &[u8]) -> CredsResult<CredentialMutation> {
        let path = self.checked_path(name)?;
        {
            let _guard = self.write_lock.lock().expect("lock poisoned");
            write_file_atomic(&path, content)?;
        }
        debug!(name, bytes = content.len(), "credential entry written");
        Ok(self.hub.publish(MutationKind::Written, vec![name.to_string()]))
    }

    fn remove_entry(&self, name: &str) -> CredsResult<Option<CredentialMutation>> {
        let path = self.checked_path(name)?;
        {
            let _guard = self.write_lock.lock().expect("lock poisoned");
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        debug!(name, "credential entry removed");
        Ok(Some(self.hub.publish(MutationKind::Removed, vec![name.to_string()])))
    }

    fn record_external_mutation(&self, names: Vec<String>) -> CredentialMutation {
        self.hub.publish(MutationKind::External, names)
    }

    fn subscribe(&self) -> MutationStream {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, FsCredentialRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsCredentialRepository::new(dir.path().join("auth"));
        (dir, repo)
    }

    #[test]
    fn snapshot_of_missing_dir_is_empty() {
        let (_dir, repo) = repo();
        assert!(repo.snapshot().unwrap().is_empty());
    }

    #[test]
    fn store_entry_is_visible_before_notification() {
        let (_dir, repo) = repo();
        let mut rx = repo.subscribe();

        let mutation = repo.store_entry("creds.json", b"{\"v\":1}").unwrap();
        assert_eq!(mutation.names, vec!["creds.json".to_string()]);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.seq, mutation.seq);
        // By the time the subscriber hears about it, the bytes are on disk.
        let snap = repo.snapshot().unwrap();
        assert_eq!(snap.get("creds.json"), Some(&b"{\"v\":1}"[..]));
    }

    #[test]
    fn nested_entries() {
        let (_dir, repo) = repo();
        repo.store_entry("keys/pre-key-1.json", b"k").unwrap();
        assert!(repo.root().join("keys").join("pre-key-1.json").exists());
        assert!(repo.snapshot().unwrap().contains("keys/pre-key-1.json"));
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_includes_names_with_colons() {
        let (_dir, repo) = repo();
        std::fs::create_dir_all(repo.root()).unwrap();
        std::fs::write(repo.root().join("note:1.json"), b"n").unwrap();
        repo.store_entry("session-1:2@lid.json", b"s").unwrap();

        let snap = repo.snapshot().unwrap();
        assert_eq!(snap.get("note:1.json"), Some(&b"n"[..]));
        assert_eq!(snap.get("session-1:2@lid.json"), Some(&b"s"[..]));
    }

    #[test]
    fn invalid_names_rejected() {
        let (_dir, repo) = repo();
        let err = repo.store_entry("../outside.json", b"x").unwrap_err();
        assert!(matches!(err, CredsError::InvalidName { .. }));
    }

    #[test]
    fn replace_does_not_notify() {
        let (_dir, repo) = repo();
        repo.store_entry("old.json", b"old").unwrap();
        let mut rx = repo.subscribe();

        let state = CredentialState::new().with_file("creds.json", b"restored".to_vec());
        repo.replace(&state).unwrap();

        assert_eq!(repo.snapshot().unwrap(), state);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remove_entry_notifies_only_when_present() {
        let (_dir, repo) = repo();
        repo.store_entry("a.json", b"a").unwrap();
        let mut rx = repo.subscribe();

        assert!(repo.remove_entry("a.json").unwrap().is_some());
        assert!(repo.remove_entry("a.json").unwrap().is_none());
        assert_eq!(rx.try_recv().unwrap().kind, MutationKind::Removed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn external_mutation_is_published() {
        let (_dir, repo) = repo();
        let mut rx = repo.subscribe();
        repo.record_external_mutation(vec!["creds.json".into()]);
        assert_eq!(rx.try_recv().unwrap().kind, MutationKind::External);
    }
}
