use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tether_types::ContainerId;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobBackend, BlobInfo};

/// Backend operation, for fault injection and call counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlobOp {
    List,
    Download,
    Create,
    Remove,
}

impl BlobOp {
    fn index(self) -> usize {
        match self {
            Self::List => 0,
            Self::Download => 1,
            Self::Create => 2,
            Self::Remove => 3,
        }
    }
}

#[derive(Clone)]
struct StoredBlob {
    info: BlobInfo,
    data: Vec<u8>,
}

/// In-memory [`BlobBackend`] for tests and embedding.
///
/// Unlike a well-behaved session store it happily keeps several blobs with
/// the same name, which makes it a faithful stand-in for real blob services.
/// Test hooks:
/// - [`Self::fail_next`] injects errors for the next N calls of an operation;
/// - [`Self::pause_creates`] / [`Self::resume_creates`] hold uploads in flight;
/// - [`Self::call_count`] and [`Self::watch_creates`] observe traffic.
pub struct InMemoryBlobBackend {
    containers: Mutex<HashMap<ContainerId, Vec<StoredBlob>>>,
    faults: Mutex<HashMap<BlobOp, (StoreError, usize)>>,
    calls: [AtomicUsize; 4],
    last_created: Mutex<Option<DateTime<Utc>>>,
    creates_started: watch::Sender<usize>,
    creates_paused: watch::Sender<bool>,
}

impl InMemoryBlobBackend {
    pub fn new() -> Self {
        let (creates_started, _) = watch::channel(0);
        let (creates_paused, _) = watch::channel(false);
        Self {
            containers: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            calls: Default::default(),
            last_created: Mutex::new(None),
            creates_started,
            creates_paused,
        }
    }

    /// Make the next `times` calls of `op` fail with `error`.
    pub fn fail_next(&self, op: BlobOp, error: StoreError, times: usize) {
        self.faults
            .lock()
            .expect("lock poisoned")
            .insert(op, (error, times));
    }

    /// Make every call of `op` fail with `error` until [`Self::clear_faults`].
    pub fn fail_always(&self, op: BlobOp, error: StoreError) {
        self.fail_next(op, error, usize::MAX);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().expect("lock poisoned").clear();
    }

    /// Block `create` calls after they are counted, until resumed.
    pub fn pause_creates(&self) {
        self.creates_paused.send_replace(true);
    }

    pub fn resume_creates(&self) {
        self.creates_paused.send_replace(false);
    }

    /// Receiver of the number of `create` calls that have started.
    pub fn watch_creates(&self) -> watch::Receiver<usize> {
        self.creates_started.subscribe()
    }

    /// Number of times `op` has been called (including failed calls).
    pub fn call_count(&self, op: BlobOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Number of blobs named `name` in `container`.
    pub fn blob_count(&self, container: &ContainerId, name: &str) -> usize {
        self.containers
            .lock()
            .expect("lock poisoned")
            .get(container)
            .map(|blobs| blobs.iter().filter(|b| b.info.name == name).count())
            .unwrap_or(0)
    }

    /// Contents of every blob named `name`, oldest first.
    pub fn contents(&self, container: &ContainerId, name: &str) -> Vec<Vec<u8>> {
        self.containers
            .lock()
            .expect("lock poisoned")
            .get(container)
            .map(|blobs| {
                blobs
                    .iter()
                    .filter(|b| b.info.name == name)
                    .map(|b| b.data.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert a blob directly, bypassing faults and counters. Useful to
    /// simulate another writer.
    pub fn insert_raw(&self, container: &ContainerId, name: &str, data: Vec<u8>) -> BlobInfo {
        let info = BlobInfo {
            id: Uuid::now_v7().simple().to_string(),
            name: name.to_string(),
            size: data.len() as u64,
            created_at: self.next_timestamp(),
        };
        self.containers
            .lock()
            .expect("lock poisoned")
            .entry(container.clone())
            .or_default()
            .push(StoredBlob {
                info: info.clone(),
                data,
            });
        info
    }

    /// Creation timestamps are strictly increasing so "newest" is well defined.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_created.lock().expect("lock poisoned");
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    fn enter(&self, op: BlobOp) -> StoreResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.lock().expect("lock poisoned");
        if let Some((error, remaining)) = faults.get_mut(&op) {
            let error = error.clone();
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                faults.remove(&op);
            }
            return Err(error);
        }
        Ok(())
    }
}

impl Default for InMemoryBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBlobBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self
            .containers
            .lock()
            .expect("lock poisoned")
            .values()
            .map(Vec::len)
            .sum();
        f.debug_struct("InMemoryBlobBackend")
            .field("blob_count", &count)
            .finish()
    }
}

#[async_trait]
impl BlobBackend for InMemoryBlobBackend {
    async fn list(&self, container: &ContainerId, name: &str) -> StoreResult<Vec<BlobInfo>> {
        self.enter(BlobOp::List)?;
        let map = self.containers.lock().expect("lock poisoned");
        Ok(map
            .get(container)
            .map(|blobs| {
                blobs
                    .iter()
                    .filter(|b| b.info.name == name)
                    .map(|b| b.info.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(&self, container: &ContainerId, id: &str) -> StoreResult<Vec<u8>> {
        self.enter(BlobOp::Download)?;
        let map = self.containers.lock().expect("lock poisoned");
        map.get(container)
            .and_then(|blobs| blobs.iter().find(|b| b.info.id == id))
            .map(|b| b.data.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{container}/{id}")))
    }

    async fn create(&self, container: &ContainerId, name: &str, data: Vec<u8>) -> StoreResult<BlobInfo> {
        self.enter(BlobOp::Create)?;
        self.creates_started.send_modify(|n| *n += 1);

        let mut paused = self.creates_paused.subscribe();
        // The sender lives as long as `self`, so this only returns once resumed.
        let _ = paused.wait_for(|p| !*p).await;

        Ok(self.insert_raw(container, name, data))
    }

    async fn remove(&self, container: &ContainerId, id: &str) -> StoreResult<()> {
        self.enter(BlobOp::Remove)?;
        let mut map = self.containers.lock().expect("lock poisoned");
        let blobs = map
            .get_mut(container)
            .ok_or_else(|| StoreError::NotFound(format!("{container}/{id}")))?;
        let before = blobs.len();
        blobs.retain(|b| b.info.id != id);
        if blobs.len() == before {
            return Err(StoreError::NotFound(format!("{container}/{id}")));
        }
        Ok(())
    }
}
