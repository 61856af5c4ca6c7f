//! Session sync coordinator for tether.
//!
//! Moves credential state between the local [`CredentialRepository`] and the
//! remote [`SessionStore`] through the archive codec:
//!
//! - **hydrate**: `get` → decode → `replace`, before the chat connection opens
//! - **sync up**: `snapshot` → `pack` → `put`, serialized and coalesced by a
//!   background [`UploadWorker`]
//! - **final sync**: an awaited upload bounded by a timeout, for shutdown and
//!   logout
//!
//! One upload and one download may be in flight at a time. The remote is
//! assumed to have a single writer per container.
//!
//! [`CredentialRepository`]: tether_creds::CredentialRepository
//! [`SessionStore`]: tether_store::SessionStore

pub mod coordinator;
pub mod error;
pub mod types;
pub mod worker;

pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use types::{
    FinalSyncOutcome, HydrationResult, SyncOptions, SyncStats, SyncUpOutcome, DEFAULT_FINAL_SYNC_TIMEOUT,
};
pub use worker::UploadWorker;
