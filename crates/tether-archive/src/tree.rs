//! Reading and writing credential directory trees.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tether_types::CredentialState;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CodecError, CodecResult};
use crate::names::{entry_path, validate_entry_name, RESERVED_PREFIX};

/// Capture every regular file below `root` into a [`CredentialState`].
///
/// A missing `root` yields an empty state. Symlinks and the codec's own
/// scratch files (names starting with [`RESERVED_PREFIX`]) are skipped.
pub fn read_tree(root: &Path) -> CodecResult<CredentialState> {
    let mut state = CredentialState::new();
    if !root.exists() {
        return Ok(state);
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with(RESERVED_PREFIX)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            CodecError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let name = relative_name(relative)?;
        validate_entry_name(&name)?;
        let content = fs::read(entry.path())?;
        state.insert(name, content);
    }
    Ok(state)
}

fn relative_name(relative: &Path) -> CodecResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| CodecError::InvalidEntryName {
            name: relative.to_string_lossy().into(),
            reason: "not valid UTF-8".into(),
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Replace the directory at `dest` with exactly the files in `state`.
///
/// The new tree is built in a staging directory under `staging_base`
/// (defaulting to `dest`'s parent; it must be on the same filesystem) and
/// swapped into place with renames. Readers of `dest` observe either the old
/// tree or the new one, never a partially written mix. If the final rename
/// fails the previous tree is put back.
pub fn materialize(state: &CredentialState, dest: &Path, staging_base: Option<&Path>) -> CodecResult<()> {
    for name in state.names() {
        validate_entry_name(name)?;
    }

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = staging_base.map(Path::to_path_buf).unwrap_or(parent.clone());
    fs::create_dir_all(&parent)?;
    fs::create_dir_all(&base)?;

    let staging = tempfile::Builder::new()
        .prefix(&format!("{RESERVED_PREFIX}staging-"))
        .tempdir_in(&base)?;
    let tree = staging.path().join("tree");
    fs::create_dir(&tree)?;

    for (name, content) in state.iter() {
        let path = entry_path(&tree, name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = fs::File::create(&path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    // Holds the previous tree until the swap succeeds; dropped afterwards.
    let backup = tempfile::Builder::new()
        .prefix(&format!("{RESERVED_PREFIX}backup-"))
        .tempdir_in(&base)?;
    let previous = backup.path().join("previous");
    let had_previous = dest.exists();
    if had_previous {
        fs::rename(dest, &previous)?;
    }

    if let Err(err) = fs::rename(&tree, dest) {
        if had_previous {
            fs::rename(&previous, dest)?;
        }
        return Err(err.into());
    }

    debug!(dest = %dest.display(), files = state.len(), "credential tree swapped into place");
    Ok(())
}

/// Write a single file atomically: temp file in the same directory, fsync,
/// then rename over the target.
pub fn write_file_atomic(path: &Path, content: &[u8]) -> CodecResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{RESERVED_PREFIX}write-"))
        .tempfile_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CodecError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CredentialState {
        CredentialState::new()
            .with_file("creds.json", b"{\"me\":{}}".to_vec())
            .with_file("keys/pre-key-1.json", b"k1".to_vec())
            .with_file("keys/nested/session-abc.json", b"s".to_vec())
    }

    #[test]
    fn missing_root_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = read_tree(&dir.path().join("nope")).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn materialize_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        materialize(&sample(), &dest, None).unwrap();
        assert_eq!(read_tree(&dest).unwrap(), sample());
    }

    #[test]
    fn materialize_replaces_existing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        fs::create_dir_all(dest.join("old")).unwrap();
        fs::write(dest.join("old/stale.json"), b"stale").unwrap();
        fs::write(dest.join("creds.json"), b"old creds").unwrap();

        materialize(&sample(), &dest, None).unwrap();

        let state = read_tree(&dest).unwrap();
        assert_eq!(state, sample());
        assert!(!dest.join("old").exists());
    }

    #[test]
    fn materialize_leaves_no_scratch_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        materialize(&sample(), &dest, None).unwrap();
        materialize(&sample(), &dest, None).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(RESERVED_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn materialize_rejects_bad_names_without_touching_dest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("auth");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("creds.json"), b"keep me").unwrap();

        let bad = CredentialState::new().with_file("../escape.json", b"x".to_vec());
        assert!(matches!(
            materialize(&bad, &dest, None),
            Err(CodecError::InvalidEntryName { .. })
        ));
        assert_eq!(fs::read(dest.join("creds.json")).unwrap(), b"keep me");
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn materialize_with_separate_staging_base() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("scratch");
        let dest = dir.path().join("auth");
        materialize(&sample(), &dest, Some(&staging)).unwrap();
        assert_eq!(read_tree(&dest).unwrap(), sample());
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[test]
    fn read_tree_skips_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("creds.json"), b"c").unwrap();
        fs::write(dir.path().join(".tether-write-xyz"), b"partial").unwrap();
        let state = read_tree(dir.path()).unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.contains("creds.json"));
    }

    #[test]
    fn atomic_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("a.json");
        write_file_atomic(&path, b"one").unwrap();
        write_file_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
