use std::sync::RwLock;

use tether_archive::validate_entry_name;
use tether_types::CredentialState;

use crate::error::{CredsError, CredsResult};
use crate::mutation::{CredentialMutation, MutationHub, MutationKind, MutationStream};
use crate::traits::CredentialRepository;

/// In-memory credential repository for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryCredentialRepository {
    state: RwLock<CredentialState>,
    hub: MutationHub,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `state` already present (no mutation is published).
    pub fn with_state(state: CredentialState) -> Self {
        Self {
            state: RwLock::new(state),
            hub: MutationHub::default(),
        }
    }

    /// Sequence number of the most recent mutation.
    pub fn last_seq(&self) -> u64 {
        self.hub.last_seq()
    }
}

impl CredentialRepository for InMemoryCredentialRepository {
    fn snapshot(&self) -> CredsResult<CredentialState> {
        Ok(self.state.read().expect("lock poisoned").clone())
    }

    fn replace(&self, state: &CredentialState) -> CredsResult<()> {
        for name in state.names() {
            validate_entry_name(name)?;
        }
        *self.state.write().expect("lock poisoned") = state.clone();
        Ok(())
    }

    fn store_entry(&self, name: &str, content: &[u8]) -> CredsResult<CredentialMutation> {
        validate_entry_name(name).map_err(|e| CredsError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.state
            .write()
            .expect("lock poisoned")
            .insert(name, content.to_vec());
        Ok(self.hub.publish(MutationKind::Written, vec![name.to_string()]))
    }

    fn remove_entry(&self, name: &str) -> CredsResult<Option<CredentialMutation>> {
        let existed = self.state.write().expect("lock poisoned").remove(name).is_some();
        Ok(existed.then(|| self.hub.publish(MutationKind::Removed, vec![name.to_string()])))
    }

    fn record_external_mutation(&self, names: Vec<String>) -> CredentialMutation {
        self.hub.publish(MutationKind::External, names)
    }

    fn subscribe(&self) -> MutationStream {
        self.hub.subscribe()
    }
}
