use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tether_types::ContainerId;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobBackend, BlobInfo};

/// [`BlobBackend`] on a local or mounted directory.
///
/// Each container is a subdirectory of `root`; each blob is a file named
/// `<uuid-v7>.<blob name>`. Suitable for a network filesystem or a synced
/// folder standing in for a remote service, and for integration tests.
#[derive(Clone, Debug)]
pub struct FsBlobBackend {
    root: PathBuf,
}

impl FsBlobBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &ContainerId) -> PathBuf {
        self.root.join(container.as_str())
    }
}

fn blob_file_name(id: &str, name: &str) -> String {
    format!("{id}.{name}")
}

/// Split `<id>.<name>` back into its parts. Returns `None` for foreign files.
fn parse_blob_file_name(file_name: &str) -> Option<(Uuid, &str)> {
    let (id, name) = file_name.split_once('.')?;
    if name.is_empty() {
        return None;
    }
    let uuid = Uuid::try_parse(id).ok()?;
    Some((uuid, name))
}

fn created_at(id: &Uuid) -> DateTime<Utc> {
    id.get_timestamp()
        .and_then(|ts| {
            let (secs, nanos) = ts.to_unix();
            DateTime::from_timestamp(secs as i64, nanos)
        })
        .unwrap_or_default()
}

fn validate_id(id: &str) -> StoreResult<()> {
    Uuid::try_parse(id)
        .map(|_| ())
        .map_err(|_| StoreError::InvalidRef(format!("malformed blob id {id:?}")))
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::RemoteUnavailable(format!("blocking task failed: {e}")))?
}

#[async_trait]
impl BlobBackend for FsBlobBackend {
    async fn list(&self, container: &ContainerId, name: &str) -> StoreResult<Vec<BlobInfo>> {
        let dir = self.container_dir(container);
        let name = name.to_string();
        blocking(move || {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(StoreError::from_io(&dir.display().to_string(), e)),
            };
            let mut found = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::from_io("list", e))?;
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };
                let Some((id, blob_name)) = parse_blob_file_name(file_name) else {
                    continue;
                };
                if blob_name != name {
                    continue;
                }
                let meta = entry.metadata().map_err(|e| StoreError::from_io(file_name, e))?;
                if !meta.is_file() {
                    continue;
                }
                found.push(BlobInfo {
                    id: id.simple().to_string(),
                    name: blob_name.to_string(),
                    size: meta.len(),
                    created_at: created_at(&id),
                });
            }
            Ok(found)
        })
        .await
    }

    async fn download(&self, container: &ContainerId, id: &str) -> StoreResult<Vec<u8>> {
        validate_id(id)?;
        let dir = self.container_dir(container);
        let id = id.to_string();
        blocking(move || {
            let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::from_io(&id, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::from_io("download", e))?;
                let file_name = entry.file_name();
                let matches = file_name
                    .to_str()
                    .and_then(parse_blob_file_name)
                    .is_some_and(|(uuid, _)| uuid.simple().to_string() == id);
                if matches {
                    return std::fs::read(entry.path()).map_err(|e| StoreError::from_io(&id, e));
                }
            }
            Err(StoreError::NotFound(id))
        })
        .await
    }

    async fn create(&self, container: &ContainerId, name: &str, data: Vec<u8>) -> StoreResult<BlobInfo> {
        let dir = self.container_dir(container);
        let name = name.to_string();
        blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::from_io("create container", e))?;
            let id = Uuid::now_v7();
            let target = dir.join(blob_file_name(&id.simple().to_string(), &name));

            // Stage under a name that never parses as a blob, then rename.
            let mut tmp = tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&dir)
                .map_err(|e| StoreError::from_io("stage upload", e))?;
            tmp.write_all(&data).map_err(|e| StoreError::from_io("stage upload", e))?;
            tmp.as_file()
                .sync_all()
                .map_err(|e| StoreError::from_io("stage upload", e))?;
            tmp.persist(&target)
                .map_err(|e| StoreError::from_io("commit upload", e.error))?;

            Ok(BlobInfo {
                id: id.simple().to_string(),
                name,
                size: data.len() as u64,
                created_at: created_at(&id),
            })
        })
        .await
    }

    async fn remove(&self, container: &ContainerId, id: &str) -> StoreResult<()> {
        validate_id(id)?;
        let dir = self.container_dir(container);
        let id = id.to_string();
        blocking(move || {
            let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::from_io(&id, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::from_io("remove", e))?;
                let file_name = entry.file_name();
                let matches = file_name
                    .to_str()
                    .and_then(parse_blob_file_name)
                    .is_some_and(|(uuid, _)| uuid.simple().to_string() == id);
                if matches {
                    return std::fs::remove_file(entry.path()).map_err(|e| StoreError::from_io(&id, e));
                }
            }
            Err(StoreError::NotFound(id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RemoteSessionStore;
    use crate::traits::SessionStore;
    use std::sync::Arc;
    use tether_types::{RemoteBlobRef, SessionArchive};

    fn container() -> ContainerId {
        ContainerId::new("drive-folder").unwrap()
    }

    #[test]
    fn parses_blob_file_names() {
        let id = Uuid::now_v7();
        let file = blob_file_name(&id.simple().to_string(), "session.pack");
        let (parsed, name) = parse_blob_file_name(&file).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(name, "session.pack");
        assert!(parse_blob_file_name(".upload-abc").is_none());
        assert!(parse_blob_file_name("readme").is_none());
    }

    #[tokio::test]
    async fn list_missing_container_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBlobBackend::new(dir.path());
        assert!(backend.list(&container(), "session.pack").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_download_remove() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBlobBackend::new(dir.path());

        let info = backend.create(&container(), "session.pack", b"bytes".to_vec()).await.unwrap();
        assert_eq!(info.size, 5);
        let listed = backend.list(&container(), "session.pack").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, info.id);

        assert_eq!(backend.download(&container(), &info.id).await.unwrap(), b"bytes");
        backend.remove(&container(), &info.id).await.unwrap();
        assert!(backend.download(&container(), &info.id).await.unwrap_err().is_not_found());
        assert!(backend.remove(&container(), &info.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_malformed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBlobBackend::new(dir.path());
        let err = backend.download(&container(), "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRef(_)));
    }

    #[tokio::test]
    async fn session_store_over_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = RemoteSessionStore::new(Arc::new(FsBlobBackend::new(dir.path())));
        let blob = RemoteBlobRef::session(container());

        for payload in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            store.put(&blob, SessionArchive::from_bytes(payload)).await.unwrap();
        }
        assert_eq!(store.get(&blob).await.unwrap().into_bytes(), b"three");

        let files = std::fs::read_dir(dir.path().join("drive-folder")).unwrap().count();
        assert_eq!(files, 1);
    }
}
