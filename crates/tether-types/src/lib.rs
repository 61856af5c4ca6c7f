//! Foundation types for tether.
//!
//! tether keeps a long-lived chat-protocol session alive across restarts by
//! mirroring its credential directory into a remote blob store. Every other
//! tether crate depends on `tether-types`.
//!
//! # Key Types
//!
//! - [`CredentialState`] — credential file name to bytes, owned by the credential repository
//! - [`ArchiveVersion`] — BLAKE3 digest of a credential state, used for staleness checks
//! - [`SessionArchive`] — immutable packed credential state, consumed by one sync
//! - [`RemoteBlobRef`] — the single canonical session blob inside a container
//! - [`ConnectionState`] — the supervisor's lifecycle state
//! - [`DisconnectCause`] — terminal (`LoggedOut`) vs retryable (`Transient`)
//! - [`SyncTicket`] — one in-flight upload or download

pub mod archive;
pub mod connection;
pub mod credential;
pub mod error;
pub mod remote;
pub mod ticket;

pub use archive::SessionArchive;
pub use connection::{ConnectionState, DisconnectCause, PairingChallenge};
pub use credential::{ArchiveVersion, CredentialState};
pub use error::TypeError;
pub use remote::{ContainerId, RemoteBlobRef, DEFAULT_BLOB_NAME};
pub use ticket::{SyncDirection, SyncTicket};
