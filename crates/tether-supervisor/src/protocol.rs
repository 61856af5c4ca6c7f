use async_trait::async_trait;
use tether_types::{CredentialState, DisconnectCause, PairingChallenge};
use tokio::sync::mpsc;

use crate::error::SupervisorResult;

/// Events delivered by the chat-protocol layer for one connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// No valid credentials; show this to the operator. May repeat while
    /// pairing (e.g. QR refresh).
    PairingChallenge(PairingChallenge),
    /// The operator's pairing attempt failed. The protocol re-issues a
    /// challenge on the same connection.
    PairingFailed { reason: String },
    ConnectionOpened,
    ConnectionClosed(DisconnectCause),
    /// The protocol rotated credentials and hands them over for durable
    /// storage.
    CredentialsUpdated { files: Vec<(String, Vec<u8>)> },
}

/// Receiver of one connection's events. A stream that ends without
/// `ConnectionClosed` counts as a transient disconnect.
pub type EventStream = mpsc::Receiver<ProtocolEvent>;

/// The chat-protocol client library, seen from the supervisor.
///
/// Socket framing, encryption and message handling live behind this trait.
#[async_trait]
pub trait ChatProtocol: Send + Sync {
    /// Open a connection with the given credentials (possibly empty).
    async fn connect(&self, credentials: CredentialState) -> SupervisorResult<EventStream>;

    /// Close the current connection, if any.
    async fn disconnect(&self);
}
