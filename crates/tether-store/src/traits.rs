use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tether_types::{ContainerId, RemoteBlobRef, SessionArchive};

use crate::error::StoreResult;

/// Metadata for one blob as reported by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    /// Backend-assigned identifier, unique within the container.
    pub id: String,
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Raw blob API of a remote storage service.
///
/// This is the thin surface every storage service offers: list by name,
/// download, create, remove. It does not prevent several blobs from sharing a
/// name; [`crate::RemoteSessionStore`] layers the single-blob policy on top.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// List blobs in `container` named exactly `name`, in any order.
    /// A container that does not exist yet lists as empty.
    async fn list(&self, container: &ContainerId, name: &str) -> StoreResult<Vec<BlobInfo>>;

    /// Download a blob's bytes by id.
    async fn download(&self, container: &ContainerId, id: &str) -> StoreResult<Vec<u8>>;

    /// Create a new blob. Never overwrites: two calls create two blobs.
    async fn create(&self, container: &ContainerId, name: &str, data: Vec<u8>) -> StoreResult<BlobInfo>;

    /// Remove a blob by id. Returns `NotFound` if it does not exist.
    async fn remove(&self, container: &ContainerId, id: &str) -> StoreResult<()>;
}

/// Stores and retrieves exactly one session archive per [`RemoteBlobRef`].
///
/// Implementations must satisfy:
/// - after `put` returns, `get` yields that archive's bytes;
/// - at most one blob per ref is observable through `get`;
/// - `delete` of an absent ref succeeds.
///
/// Writers are not coordinated across processes. Callers must guarantee a
/// single writer per container.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, blob: &RemoteBlobRef) -> StoreResult<bool>;

    /// Fetch the archive. `NotFound` if absent.
    async fn get(&self, blob: &RemoteBlobRef) -> StoreResult<SessionArchive>;

    /// Replace whatever is stored under `blob` with `archive`.
    async fn put(&self, blob: &RemoteBlobRef, archive: SessionArchive) -> StoreResult<()>;

    /// Remove the blob. Idempotent.
    async fn delete(&self, blob: &RemoteBlobRef) -> StoreResult<()>;
}
