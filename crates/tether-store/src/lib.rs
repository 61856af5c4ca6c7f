//! Remote session store for tether.
//!
//! Keeps exactly one session archive per container in a remote blob
//! service. Two layers:
//!
//! - [`BlobBackend`] -- the raw service API (list / download / create /
//!   remove). Blob services allow duplicate names, so this layer does too.
//! - [`SessionStore`] -- `exists` / `get` / `put` / `delete` on a
//!   [`RemoteBlobRef`](tether_types::RemoteBlobRef), implemented by
//!   [`RemoteSessionStore`] over any backend.
//!
//! # Backends
//!
//! - [`InMemoryBlobBackend`] -- tests and embedding, with fault injection
//! - [`FsBlobBackend`] -- a directory per container
//!
//! # Concurrency
//!
//! `put` is list, delete-all, create. It is not atomic against a second
//! writer process; one writer per container is a deployment precondition.
//! A backend offering conditional writes (compare-and-swap on a version
//! token) could close the gap without changing the [`SessionStore`] trait.

pub mod error;
pub mod fs;
pub mod memory;
pub mod session;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobBackend;
pub use memory::{BlobOp, InMemoryBlobBackend};
pub use session::RemoteSessionStore;
pub use traits::{BlobBackend, BlobInfo, SessionStore};
