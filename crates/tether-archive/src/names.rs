use std::path::{Path, PathBuf};

use crate::error::{CodecError, CodecResult};

const MAX_NAME_LEN: usize = 4096;

/// Prefix reserved for the codec's and repository's scratch files.
/// Entries whose file name starts with it are never captured.
pub const RESERVED_PREFIX: &str = ".tether-";

/// Check that an entry name is a safe, relative, `/`-separated path.
///
/// Only names that could escape the destination are refused. Any other byte
/// sequence a POSIX file name may hold (`:`, `\`, spaces, non-ASCII) is
/// accepted.
pub fn validate_entry_name(name: &str) -> CodecResult<()> {
    let fail = |reason: &str| {
        Err(CodecError::InvalidEntryName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return fail("empty name");
    }
    if name.len() > MAX_NAME_LEN {
        return fail("name too long");
    }
    if name.starts_with('/') {
        return fail("must be a relative path");
    }
    if name.contains('\0') {
        return fail("contains NUL");
    }
    // Both are path syntax on Windows.
    if cfg!(windows) && (name.contains('\\') || name.contains(':')) {
        return fail("must be a relative path using '/' separators");
    }
    for segment in name.split('/') {
        match segment {
            "" => return fail("empty path segment"),
            "." | ".." => return fail("relative path segment"),
            s if s.starts_with(RESERVED_PREFIX) => return fail("reserved prefix"),
            _ => {}
        }
    }
    Ok(())
}

/// Resolve an entry name below `root`.
pub(crate) fn entry_path(root: &Path, name: &str) -> PathBuf {
    name.split('/').fold(root.to_path_buf(), |path, seg| path.join(seg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert!(validate_entry_name("creds.json").is_ok());
        assert!(validate_entry_name("keys/pre-key-12.json").is_ok());
        assert!(validate_entry_name(".hidden").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn accepts_posix_legal_punctuation() {
        for ok in ["session-1:2@lid.json", "note:1.json", "a\\b", "app state sync.json", "x\ny"] {
            assert!(validate_entry_name(ok).is_ok(), "{ok:?} should be accepted");
        }
    }

    #[test]
    fn rejects_escapes() {
        for bad in ["", "/etc/passwd", "../creds.json", "a/../b", "a//b", "a/./b", "..", "x\0y"] {
            assert!(validate_entry_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_reserved_prefix() {
        assert!(validate_entry_name(".tether-staging-1/creds.json").is_err());
        assert!(validate_entry_name("keys/.tether-write-abc").is_err());
    }

    #[test]
    fn entry_path_joins_segments() {
        let p = entry_path(Path::new("/tmp/auth"), "keys/one.json");
        assert_eq!(p, Path::new("/tmp/auth").join("keys").join("one.json"));
    }
}
