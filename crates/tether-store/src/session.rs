use std::sync::Arc;

use async_trait::async_trait;
use tether_types::{RemoteBlobRef, SessionArchive};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobBackend, BlobInfo, SessionStore};

/// [`SessionStore`] over any [`BlobBackend`], enforcing one blob per name.
///
/// `put` lists every blob with the target name, deletes all of them, then
/// creates the new one. This is not atomic: two processes racing here can
/// leave two blobs, or delete each other's upload. The design assumes one
/// writer per container. `get` tolerates leftovers by reading the newest
/// blob and logging a warning.
pub struct RemoteSessionStore {
    backend: Arc<dyn BlobBackend>,
}

impl RemoteSessionStore {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn BlobBackend> {
        &self.backend
    }

    async fn remove_all(&self, blob: &RemoteBlobRef, existing: &[BlobInfo]) -> StoreResult<usize> {
        let mut removed = 0;
        for info in existing {
            match self.backend.remove(&blob.container, &info.id).await {
                Ok(()) => removed += 1,
                // Already gone; the goal state is reached either way.
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

fn newest(blobs: &[BlobInfo]) -> Option<&BlobInfo> {
    blobs
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

#[async_trait]
impl SessionStore for RemoteSessionStore {
    async fn exists(&self, blob: &RemoteBlobRef) -> StoreResult<bool> {
        let found = self.backend.list(&blob.container, &blob.name).await?;
        Ok(!found.is_empty())
    }

    async fn get(&self, blob: &RemoteBlobRef) -> StoreResult<SessionArchive> {
        let found = self.backend.list(&blob.container, &blob.name).await?;
        let Some(latest) = newest(&found) else {
            return Err(StoreError::NotFound(blob.to_string()));
        };
        if found.len() > 1 {
            warn!(
                blob = %blob,
                count = found.len(),
                chosen = %latest.id,
                "multiple session blobs found; reading the newest"
            );
        }
        let bytes = match self.backend.download(&blob.container, &latest.id).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return Err(StoreError::NotFound(blob.to_string())),
            Err(e) => return Err(e),
        };
        debug!(blob = %blob, id = %latest.id, bytes = bytes.len(), "session blob downloaded");
        Ok(SessionArchive::from_bytes(bytes))
    }

    async fn put(&self, blob: &RemoteBlobRef, archive: SessionArchive) -> StoreResult<()> {
        let existing = self.backend.list(&blob.container, &blob.name).await?;
        let removed = self.remove_all(blob, &existing).await?;
        let version = archive.version();
        let created = self
            .backend
            .create(&blob.container, &blob.name, archive.into_bytes())
            .await?;
        info!(
            blob = %blob,
            id = %created.id,
            bytes = created.size,
            replaced = removed,
            version = %version.map(|v| v.short_hex()).unwrap_or_else(|| "-".into()),
            "session blob uploaded"
        );
        Ok(())
    }

    async fn delete(&self, blob: &RemoteBlobRef) -> StoreResult<()> {
        let existing = self.backend.list(&blob.container, &blob.name).await?;
        let removed = self.remove_all(blob, &existing).await?;
        debug!(blob = %blob, removed, "session blob deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BlobOp, InMemoryBlobBackend};
    use tether_types::{ArchiveVersion, ContainerId};

    fn fixture() -> (Arc<InMemoryBlobBackend>, RemoteSessionStore, RemoteBlobRef) {
        let backend = Arc::new(InMemoryBlobBackend::new());
        let store = RemoteSessionStore::new(backend.clone());
        let blob = RemoteBlobRef::session(ContainerId::new("folder").unwrap());
        (backend, store, blob)
    }

    fn archive(bytes: &[u8]) -> SessionArchive {
        SessionArchive::new(bytes.to_vec(), ArchiveVersion::from_hash([1u8; 32]))
    }

    #[tokio::test]
    async fn get_absent_is_not_found() {
        let (_, store, blob) = fixture();
        assert!(!store.exists(&blob).await.unwrap());
        let err = store.get(&blob).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn put_then_get() {
        let (_, store, blob) = fixture();
        store.put(&blob, archive(b"first")).await.unwrap();
        assert!(store.exists(&blob).await.unwrap());
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), b"first");
    }

    #[tokio::test]
    async fn repeated_puts_keep_a_single_blob() {
        let (backend, store, blob) = fixture();
        for i in 0..5u8 {
            store.put(&blob, archive(&[i; 4])).await.unwrap();
            assert_eq!(backend.blob_count(&blob.container, &blob.name), 1);
        }
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), vec![4u8; 4]);
        assert_eq!(backend.call_count(BlobOp::Create), 5);
    }

    #[tokio::test]
    async fn put_cleans_up_duplicates_left_by_racing_writers() {
        let (backend, store, blob) = fixture();
        backend.insert_raw(&blob.container, &blob.name, b"stale-a".to_vec());
        backend.insert_raw(&blob.container, &blob.name, b"stale-b".to_vec());
        assert_eq!(backend.blob_count(&blob.container, &blob.name), 2);

        store.put(&blob, archive(b"fresh")).await.unwrap();
        assert_eq!(backend.blob_count(&blob.container, &blob.name), 1);
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), b"fresh");
    }

    #[tokio::test]
    async fn get_with_duplicates_reads_newest() {
        let (backend, store, blob) = fixture();
        backend.insert_raw(&blob.container, &blob.name, b"older".to_vec());
        backend.insert_raw(&blob.container, &blob.name, b"newer".to_vec());
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), b"newer");
    }

    #[tokio::test]
    async fn other_names_are_untouched() {
        let (backend, store, blob) = fixture();
        backend.insert_raw(&blob.container, "notes.txt", b"keep".to_vec());
        store.put(&blob, archive(b"x")).await.unwrap();
        store.delete(&blob).await.unwrap();
        assert_eq!(backend.blob_count(&blob.container, "notes.txt"), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_, store, blob) = fixture();
        store.delete(&blob).await.unwrap();
        store.put(&blob, archive(b"x")).await.unwrap();
        store.delete(&blob).await.unwrap();
        store.delete(&blob).await.unwrap();
        assert!(!store.exists(&blob).await.unwrap());
    }

    #[tokio::test]
    async fn error_kinds_pass_through() {
        let (backend, store, blob) = fixture();
        backend.fail_next(BlobOp::List, StoreError::RemoteUnavailable("dns".into()), 1);
        assert!(store.get(&blob).await.unwrap_err().is_transient());

        backend.fail_next(BlobOp::Create, StoreError::RemoteRejected("quota".into()), 1);
        let err = store.put(&blob, archive(b"x")).await.unwrap_err();
        assert!(matches!(err, StoreError::RemoteRejected(_)));

        // Faults are consumed; the next call succeeds.
        store.put(&blob, archive(b"y")).await.unwrap();
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), b"y");
    }
}
