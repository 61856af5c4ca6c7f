use chrono::{DateTime, Utc};
use serde::Serialize;
use tether_sync::{FinalSyncOutcome, SyncUpOutcome};
use tether_types::ConnectionState;

/// Why the supervisor stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// The account logged this client out.
    LoggedOut,
    /// An external shutdown was requested.
    Shutdown,
    /// Too many consecutive pairing failures.
    PairingExhausted,
}

/// One recorded state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: DateTime<Utc>,
}

/// What happened to the final sync on the way out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FinalSyncRecord {
    Completed(SyncUpOutcome),
    TimedOut,
    Failed { error: String },
}

impl From<FinalSyncOutcome> for FinalSyncRecord {
    fn from(outcome: FinalSyncOutcome) -> Self {
        match outcome {
            FinalSyncOutcome::Completed(o) => Self::Completed(o),
            FinalSyncOutcome::TimedOut => Self::TimedOut,
        }
    }
}

/// Summary returned by [`crate::ConnectionSupervisor::run`].
#[derive(Clone, Debug, Serialize)]
pub struct SupervisorReport {
    /// Hydrate-connect cycles started.
    pub cycles: u32,
    pub reason: TerminationReason,
    /// `None` when no final sync was attempted.
    pub final_sync: Option<FinalSyncRecord>,
    pub transitions: Vec<Transition>,
}

impl SupervisorReport {
    /// The sequence of states visited, starting from `Idle`.
    pub fn states(&self) -> Vec<ConnectionState> {
        let mut states = vec![ConnectionState::Idle];
        states.extend(self.transitions.iter().map(|t| t.to));
        states
    }
}
