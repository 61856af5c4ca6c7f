//! Credential repository for tether.
//!
//! Owns the local on-disk copy of the chat session's credentials. The chat
//! protocol layer writes rotated keys through [`CredentialRepository::store_entry`];
//! every durable write publishes a [`CredentialMutation`], which is the one
//! and only trigger for uploading the session to the remote store.
//!
//! - [`FsCredentialRepository`] -- a directory of credential files
//! - [`InMemoryCredentialRepository`] -- tests and embedding

pub mod error;
pub mod fs;
pub mod memory;
pub mod mutation;
pub mod traits;

pub use error::{CredsError, CredsResult};
pub use fs::FsCredentialRepository;
pub use memory::InMemoryCredentialRepository;
pub use mutation::{CredentialMutation, MutationHub, MutationKind, MutationStream};
pub use traits::CredentialRepository;
