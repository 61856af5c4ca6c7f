use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// What happened to the credential files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Files were (re)written through the repository.
    Written,
    /// Files were removed through the repository.
    Removed,
    /// Files were changed by another component and reported afterwards.
    External,
}

/// Notification that credential files changed on disk.
///
/// Delivered only after the change is durable locally, so a subscriber that
/// snapshots the repository on receipt always sees the new content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMutation {
    /// Per-repository sequence number, starting at 1.
    pub seq: u64,
    pub kind: MutationKind,
    pub names: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Receiver side of a mutation subscription.
///
/// A slow subscriber may observe `RecvError::Lagged`; that still means "at
/// least one mutation happened" and must be handled as such.
pub type MutationStream = broadcast::Receiver<CredentialMutation>;

/// Fan-out of mutation notifications to subscribers.
#[derive(Debug)]
pub struct MutationHub {
    sender: broadcast::Sender<CredentialMutation>,
    seq: AtomicU64,
}

impl MutationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> MutationStream {
        self.sender.subscribe()
    }

    /// Publish a mutation. Having no subscribers is not an error.
    pub fn publish(&self, kind: MutationKind, names: Vec<String>) -> CredentialMutation {
        let mutation = CredentialMutation {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            kind,
            names,
            at: Utc::now(),
        };
        let delivered = self.sender.send(mutation.clone()).unwrap_or(0);
        trace!(seq = mutation.seq, ?kind, delivered, "credential mutation published");
        mutation
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sequence number of the most recent mutation (0 if none).
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

impl Default for MutationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let hub = MutationHub::default();
        let a = hub.publish(MutationKind::Written, vec!["a".into()]);
        let b = hub.publish(MutationKind::Removed, vec!["a".into()]);
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert_eq!(hub.last_seq(), 2);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let hub = MutationHub::default();
        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(MutationKind::Written, vec!["creds.json".into()]);
        hub.publish(MutationKind::External, vec![]);
        assert_eq!(rx.try_recv().unwrap().kind, MutationKind::Written);
        assert_eq!(rx.try_recv().unwrap().kind, MutationKind::External);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lagging_subscriber_is_told() {
        let hub = MutationHub::new(2);
        let mut rx = hub.subscribe();
        for _ in 0..5 {
            hub.publish(MutationKind::Written, vec![]);
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
