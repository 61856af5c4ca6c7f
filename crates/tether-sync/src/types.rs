use std::time::Duration;

use serde::Serialize;
use tether_archive::DEFAULT_COMPRESSION_LEVEL;
use tether_types::{ArchiveVersion, RemoteBlobRef};

/// Default bound on [`crate::SyncCoordinator::final_sync`].
pub const DEFAULT_FINAL_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a successful hydrate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum HydrationResult {
    /// Local credentials were replaced with the remote session.
    Restored { version: ArchiveVersion, files: usize },
    /// The remote holds no session; a fresh pairing is needed.
    NotFound,
    /// Local credentials changed since they last matched the remote and
    /// those changes were never uploaded. They are kept; the caller should
    /// upload them.
    LocalNewer { version: ArchiveVersion },
}

/// Outcome of one upload attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SyncUpOutcome {
    Uploaded { version: ArchiveVersion },
    /// The remote already holds this exact content.
    UpToDate { version: ArchiveVersion },
    /// There are no local credentials to back up.
    NothingToUpload,
}

impl SyncUpOutcome {
    pub fn version(&self) -> Option<ArchiveVersion> {
        match self {
            Self::Uploaded { version } | Self::UpToDate { version } => Some(*version),
            Self::NothingToUpload => None,
        }
    }
}

/// Outcome of a bounded final sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FinalSyncOutcome {
    Completed(SyncUpOutcome),
    /// The deadline passed first; the remote may be stale.
    TimedOut,
}

impl FinalSyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Counters kept by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Upload triggers received (before coalescing).
    pub triggers: u64,
    pub uploads: u64,
    /// Upload attempts that found nothing new to send.
    pub skipped: u64,
    pub failures: u64,
    pub final_syncs: u64,
    pub hydrations: u64,
    pub last_uploaded: Option<ArchiveVersion>,
    pub last_error: Option<String>,
}

/// Coordinator settings.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub blob: RemoteBlobRef,
    pub compression_level: i32,
    pub final_sync_timeout: Duration,
}

impl SyncOptions {
    pub fn new(blob: RemoteBlobRef) -> Self {
        Self {
            blob,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            final_sync_timeout: DEFAULT_FINAL_SYNC_TIMEOUT,
        }
    }

    pub fn with_final_sync_timeout(mut self, timeout: Duration) -> Self {
        self.final_sync_timeout = timeout;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::ContainerId;

    #[test]
    fn options_defaults() {
        let opts = SyncOptions::new(RemoteBlobRef::session(ContainerId::new("c").unwrap()));
        assert_eq!(opts.final_sync_timeout, Duration::from_secs(30));
        assert_eq!(opts.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(opts.blob.name, "session.pack");
    }

    #[test]
    fn outcome_versions() {
        let v = ArchiveVersion::from_hash([3; 32]);
        assert_eq!(SyncUpOutcome::Uploaded { version: v }.version(), Some(v));
        assert_eq!(SyncUpOutcome::NothingToUpload.version(), None);
        assert!(FinalSyncOutcome::Completed(SyncUpOutcome::NothingToUpload).is_completed());
        assert!(!FinalSyncOutcome::TimedOut.is_completed());
    }
}
