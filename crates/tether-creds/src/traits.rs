use tether_types::CredentialState;

use crate::error::CredsResult;
use crate::mutation::{CredentialMutation, MutationStream};

/// Owner of the live session's on-disk credentials.
///
/// Implementations must be thread-safe and uphold:
/// - `replace` is all-or-nothing: a crash mid-replace never leaves a partial
///   credential set behind;
/// - single-entry writes are atomic per file;
/// - a [`CredentialMutation`] is published only after the write it describes
///   is durable, and at least once per actual change.
///
/// Methods block on filesystem I/O; async callers should run them on a
/// blocking thread.
pub trait CredentialRepository: Send + Sync {
    /// Read the current credential files.
    fn snapshot(&self) -> CredsResult<CredentialState>;

    /// Overwrite the credential files with exactly `state`.
    ///
    /// Used to restore content that came from the remote store, so it does
    /// not publish a mutation.
    fn replace(&self, state: &CredentialState) -> CredsResult<()>;

    /// Durably write one credential file, then publish a mutation.
    fn store_entry(&self, name: &str, content: &[u8]) -> CredsResult<CredentialMutation>;

    /// Remove one credential file. Publishes a mutation only if it existed.
    fn remove_entry(&self, name: &str) -> CredsResult<Option<CredentialMutation>>;

    /// Report files that another component already wrote durably.
    fn record_external_mutation(&self, names: Vec<String>) -> CredentialMutation;

    /// Subscribe to mutations published after this call.
    fn subscribe(&self) -> MutationStream;
}
