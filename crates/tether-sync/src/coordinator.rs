use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_archive::ArchiveCodec;
use tether_creds::CredentialRepository;
use tether_store::{SessionStore, StoreError};
use tether_types::{ArchiveVersion, RemoteBlobRef, SyncDirection, SyncTicket};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::{FinalSyncOutcome, HydrationResult, SyncOptions, SyncStats, SyncUpOutcome};
use crate::worker::UploadWorker;

/// Moves credential state between the local repository and the remote store.
///
/// - `hydrate` restores the remote session into the repository;
/// - `sync_up` snapshots, packs and uploads, one upload at a time;
/// - `trigger_sync_up` requests an upload from the background worker,
///   coalescing any number of requests made while an upload is in flight
///   into a single trailing upload;
/// - `final_sync` is a bounded, awaited upload for shutdown.
///
/// Uploads are skipped when the packed content equals the version last known
/// to be on the remote. A hydrate never overwrites local changes the remote
/// has not received yet, and never runs while an upload is in flight.
pub struct SyncCoordinator {
    store: Arc<dyn SessionStore>,
    repo: Arc<dyn CredentialRepository>,
    codec: ArchiveCodec,
    options: SyncOptions,
    upload_lock: tokio::sync::Mutex<()>,
    download_lock: tokio::sync::Mutex<()>,
    pub(crate) pending: Notify,
    remote_version: Mutex<Option<ArchiveVersion>>,
    /// Content local and remote last agreed on. Survives failed uploads.
    synced: Mutex<Option<ArchiveVersion>>,
    stats: watch::Sender<SyncStats>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn SessionStore>, repo: Arc<dyn CredentialRepository>, options: SyncOptions) -> Self {
        let (stats, _) = watch::channel(SyncStats::default());
        Self {
            store,
            repo,
            codec: ArchiveCodec::new().with_level(options.compression_level),
            options,
            upload_lock: tokio::sync::Mutex::new(()),
            download_lock: tokio::sync::Mutex::new(()),
            pending: Notify::new(),
            remote_version: Mutex::new(None),
            synced: Mutex::new(None),
            stats,
        }
    }

    pub fn blob(&self) -> &RemoteBlobRef {
        &self.options.blob
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn repository(&self) -> &Arc<dyn CredentialRepository> {
        &self.repo
    }

    /// Version last confirmed on the remote by an upload or hydrate.
    pub fn remote_version(&self) -> Option<ArchiveVersion> {
        *self.remote_version.lock().expect("lock poisoned")
    }

    fn set_remote_version(&self, version: Option<ArchiveVersion>) {
        *self.remote_version.lock().expect("lock poisoned") = version;
    }

    /// Version local and remote last held in common, if any sync succeeded.
    pub fn synced_version(&self) -> Option<ArchiveVersion> {
        *self.synced.lock().expect("lock poisoned")
    }

    fn confirm(&self, version: ArchiveVersion) {
        self.set_remote_version(Some(version));
        *self.synced.lock().expect("lock poisoned") = Some(version);
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.borrow().clone()
    }

    /// Receiver notified whenever the counters change.
    pub fn watch_stats(&self) -> watch::Receiver<SyncStats> {
        self.stats.subscribe()
    }

    /// Restore the remote session into the local repository.
    ///
    /// `NotFound` means the remote holds no session and is not an error.
    /// `LocalNewer` means local credentials changed after the last successful
    /// sync and were kept. Every other failure is reported as
    /// [`SyncError::HydrationFailed`] and leaves the local credentials
    /// untouched.
    pub async fn hydrate(&self) -> SyncResult<HydrationResult> {
        let _upload = self.upload_lock.lock().await;
        let _guard = self.download_lock.lock().await;
        let ticket = SyncTicket::new(SyncDirection::Download);
        self.stats.send_modify(|s| s.hydrations += 1);

        match self.hydrate_locked(&ticket).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(
                    ticket = %ticket.short_id(),
                    blob = %self.options.blob,
                    error = %err,
                    "hydration failed; continuing with local credentials"
                );
                self.record_failure(&err);
                Err(SyncError::HydrationFailed(Box::new(err)))
            }
        }
    }

    async fn hydrate_locked(&self, ticket: &SyncTicket) -> SyncResult<HydrationResult> {
        if let Some(version) = self.unsynced_local().await? {
            info!(
                ticket = %ticket.short_id(),
                blob = %self.options.blob,
                version = %version.short_hex(),
                "local credentials have unsynced changes; keeping them"
            );
            return Ok(HydrationResult::LocalNewer { version });
        }

        let archive = match self.store.get(&self.options.blob).await {
            Ok(archive) => archive,
            Err(StoreError::NotFound(_)) => {
                info!(ticket = %ticket.short_id(), blob = %self.options.blob, "no remote session; pairing required");
                return Ok(HydrationResult::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let codec = self.codec.clone();
        let repo = Arc::clone(&self.repo);
        let state = blocking(move || {
            let state = codec.decode(&archive)?;
            repo.replace(&state)?;
            Ok(state)
        })
        .await?;

        let version = state.version();
        self.confirm(version);
        info!(
            ticket = %ticket.short_id(),
            blob = %self.options.blob,
            version = %version.short_hex(),
            files = state.len(),
            "session restored from remote"
        );
        Ok(HydrationResult::Restored {
            version,
            files: state.len(),
        })
    }

    /// Version of the local credentials when they differ from the last
    /// synced content. Nothing counts as unsynced before the first sync.
    async fn unsynced_local(&self) -> SyncResult<Option<ArchiveVersion>> {
        let Some(synced) = self.synced_version() else {
            return Ok(None);
        };
        let repo = Arc::clone(&self.repo);
        let local = blocking(move || Ok(repo.snapshot()?)).await?;
        let version = local.version();
        Ok((!local.is_empty() && version != synced).then_some(version))
    }

    /// Request an upload from the background worker and return immediately.
    ///
    /// Requests made while an upload is running collapse into one trailing
    /// upload of the then-current state.
    pub fn trigger_sync_up(&self) {
        self.stats.send_modify(|s| s.triggers += 1);
        self.pending.notify_one();
    }

    /// Start the background worker that serves [`Self::trigger_sync_up`].
    pub fn spawn_upload_worker(self: &Arc<Self>) -> UploadWorker {
        UploadWorker::spawn(Arc::clone(self))
    }

    /// Snapshot, pack and upload the current credentials, waiting for any
    /// upload already in flight first.
    pub async fn sync_up(&self) -> SyncResult<SyncUpOutcome> {
        let _guard = self.upload_lock.lock().await;
        self.upload_locked().await
    }

    async fn upload_locked(&self) -> SyncResult<SyncUpOutcome> {
        let ticket = SyncTicket::new(SyncDirection::Upload);
        match self.try_upload(&ticket).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if err.is_rejected() {
                    error!(ticket = %ticket.short_id(), blob = %self.options.blob, error = %err, "remote rejected session upload");
                } else {
                    warn!(ticket = %ticket.short_id(), blob = %self.options.blob, error = %err, "session upload failed; will retry on next trigger");
                }
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    async fn try_upload(&self, ticket: &SyncTicket) -> SyncResult<SyncUpOutcome> {
        let codec = self.codec.clone();
        let repo = Arc::clone(&self.repo);
        let packed = blocking(move || {
            let state = repo.snapshot()?;
            if state.is_empty() {
                return Ok(None);
            }
            let version = state.version();
            Ok(Some((codec.pack(&state)?, version)))
        })
        .await?;

        let Some((archive, version)) = packed else {
            debug!(ticket = %ticket.short_id(), "no local credentials; nothing to upload");
            self.stats.send_modify(|s| s.skipped += 1);
            return Ok(SyncUpOutcome::NothingToUpload);
        };

        if self.remote_version() == Some(version) {
            debug!(ticket = %ticket.short_id(), version = %version.short_hex(), "remote already up to date");
            self.confirm(version);
            self.stats.send_modify(|s| s.skipped += 1);
            return Ok(SyncUpOutcome::UpToDate { version });
        }

        // Any replace that does not finish, whether it fails or is dropped,
        // may already have removed the previous blob.
        self.set_remote_version(None);
        let bytes = archive.len();
        self.store.put(&self.options.blob, archive).await?;

        self.confirm(version);
        self.stats.send_modify(|s| {
            s.uploads += 1;
            s.last_uploaded = Some(version);
        });
        info!(
            ticket = %ticket.short_id(),
            blob = %self.options.blob,
            version = %version.short_hex(),
            bytes,
            "session uploaded"
        );
        Ok(SyncUpOutcome::Uploaded { version })
    }

    /// Upload the current credentials and wait for the result, giving up
    /// after the configured timeout.
    pub async fn final_sync(&self) -> SyncResult<FinalSyncOutcome> {
        self.final_sync_within(self.options.final_sync_timeout).await
    }

    /// [`Self::final_sync`] with an explicit deadline.
    ///
    /// On timeout the in-flight upload is abandoned and the remote may hold
    /// the previous session, or none if the abandoned upload had already
    /// removed it.
    pub async fn final_sync_within(&self, timeout: Duration) -> SyncResult<FinalSyncOutcome> {
        self.stats.send_modify(|s| s.final_syncs += 1);
        let attempt = async {
            let _guard = self.upload_lock.lock().await;
            self.upload_locked().await
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(outcome)) => {
                info!(blob = %self.options.blob, ?outcome, "final sync completed");
                Ok(FinalSyncOutcome::Completed(outcome))
            }
            Ok(Err(err)) => {
                error!(blob = %self.options.blob, error = %err, "final sync failed");
                Err(err)
            }
            Err(_) => {
                error!(blob = %self.options.blob, timeout_ms = timeout.as_millis() as u64, "final sync timed out");
                self.stats.send_modify(|s| s.last_error = Some("final sync timed out".into()));
                Ok(FinalSyncOutcome::TimedOut)
            }
        }
    }

    fn record_failure(&self, err: &SyncError) {
        let message = err.to_string();
        self.stats.send_modify(|s| {
            s.failures += 1;
            s.last_error = Some(message);
        });
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("blob", &self.options.blob)
            .field("remote_version", &self.remote_version())
            .finish()
    }
}

async fn blocking<T, F>(f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
}
