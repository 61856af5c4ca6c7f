use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle state of the chat-protocol connection.
///
/// ```text
///   Idle -> Hydrating -> Connecting -> Open -> Closing -> Idle (transient)
///                            |  ^        ^        \---> Terminated (logged out)
///                            v  |        |
///                        AwaitingPairing-/
/// ```
///
/// Any non-terminal state may also move straight to `Terminated` on shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Hydrating,
    Connecting,
    AwaitingPairing,
    Open,
    Closing,
    Terminated,
}

impl ConnectionState {
    /// Returns `true` for the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Hydrating)
            | (Hydrating, Connecting)
            | (Connecting, AwaitingPairing)
            | (Connecting, Open)
            | (Connecting, Closing)
            | (AwaitingPairing, Open)
            | (AwaitingPairing, Connecting)
            | (AwaitingPairing, Closing)
            | (Open, Closing)
            | (Closing, Idle) => true,
            _ => false,
        }
    }

    /// Validate `self -> next`, returning `next` on success.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, TypeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TypeError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Hydrating => "hydrating",
            Self::Connecting => "connecting",
            Self::AwaitingPairing => "awaiting-pairing",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why the protocol layer closed the connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectCause {
    /// The account logged this client out or invalidated its credentials.
    LoggedOut,
    /// Network error, server restart, timeout, or anything else retryable.
    Transient { reason: String },
}

impl DisconnectCause {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Terminal causes end the session; everything else reconnects.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::Transient { reason } => write!(f, "transient: {reason}"),
        }
    }
}

/// A one-time pairing challenge to show to the human operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingChallenge {
    /// Payload to render as a QR code and scan with the phone.
    QrCode { payload: String },
    /// Code to type into the phone's "link with phone number" screen.
    NumericCode { code: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn happy_path_transitions() {
        let path = [Idle, Hydrating, Connecting, AwaitingPairing, Open, Closing, Idle];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Connecting.can_transition_to(Open));
        assert!(Closing.can_transition_to(Terminated));
    }

    #[test]
    fn rejects_skipping_hydration() {
        assert!(!Idle.can_transition_to(Connecting));
        assert!(!Idle.can_transition_to(Open));
        let err = Idle.transition(Open).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidTransition {
                from: "idle".into(),
                to: "open".into()
            }
        );
    }

    #[test]
    fn terminated_is_final() {
        for next in [Idle, Hydrating, Connecting, AwaitingPairing, Open, Closing, Terminated] {
            assert!(!Terminated.can_transition_to(next));
        }
        assert!(Terminated.is_terminal());
    }

    #[test]
    fn open_cannot_reenter_connecting_directly() {
        assert!(!Open.can_transition_to(Connecting));
        assert!(!Open.can_transition_to(Idle));
    }

    #[test]
    fn disconnect_cause_classification() {
        assert!(DisconnectCause::LoggedOut.is_terminal());
        assert!(!DisconnectCause::transient("timeout").is_terminal());
        assert_eq!(
            DisconnectCause::transient("timeout").to_string(),
            "transient: timeout"
        );
    }
}
