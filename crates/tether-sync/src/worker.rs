use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::coordinator::SyncCoordinator;

/// Handle to the background upload task.
///
/// The task waits for [`SyncCoordinator::trigger_sync_up`] and runs one
/// upload per wake-up. A wake-up permit is stored while an upload runs, so
/// any burst of triggers during that upload yields exactly one more upload.
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct UploadWorker {
    handle: Option<JoinHandle<()>>,
    stop: Arc<Notify>,
}

impl UploadWorker {
    pub(crate) fn spawn(coordinator: Arc<SyncCoordinator>) -> Self {
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_signal.notified() => break,
                    _ = coordinator.pending.notified() => {
                        // Failures are logged and counted by the coordinator;
                        // the next trigger retries.
                        let _ = coordinator.sync_up().await;
                    }
                }
            }
            debug!(blob = %coordinator.blob(), "upload worker stopped");
        });
        Self {
            handle: Some(handle),
            stop,
        }
    }

    /// Stop after the current upload, if any, and wait for the task to end.
    /// Triggers still pending are dropped; follow with a final sync.
    pub async fn shutdown(mut self) {
        self.stop.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
