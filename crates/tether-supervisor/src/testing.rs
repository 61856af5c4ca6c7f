//! Scripted collaborators for exercising the supervisor without a real chat
//! protocol or terminal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_types::{CredentialState, PairingChallenge};
use tokio::sync::{mpsc, watch};

use crate::error::{SupervisorError, SupervisorResult};
use crate::presenter::PairingPresenter;
use crate::protocol::{ChatProtocol, EventStream, ProtocolEvent};

/// What one `connect` call does.
#[derive(Clone, Debug, Default)]
pub struct Script {
    events: Vec<ProtocolEvent>,
    hold: bool,
    fail: Option<String>,
}

impl Script {
    /// Deliver `events`, then keep the stream open until `disconnect`.
    pub fn new(events: Vec<ProtocolEvent>) -> Self {
        Self {
            events,
            hold: true,
            fail: None,
        }
    }

    /// End the stream after the scripted events.
    pub fn then_end(mut self) -> Self {
        self.hold = false;
        self
    }

    /// Make `connect` itself fail.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            hold: false,
            fail: Some(reason.into()),
        }
    }
}

/// [`ChatProtocol`] that replays one [`Script`] per `connect`.
///
/// Once the scripts run out, further connections stay open and silent.
/// [`Self::inject`] pushes extra events into the live connection.
pub struct ScriptedProtocol {
    scripts: Mutex<VecDeque<Script>>,
    live: Mutex<Option<mpsc::Sender<ProtocolEvent>>>,
    received: Mutex<Vec<CredentialState>>,
    connects: watch::Sender<usize>,
    disconnects: AtomicUsize,
}

impl ScriptedProtocol {
    pub fn new(scripts: Vec<Script>) -> Self {
        let (connects, _) = watch::channel(0);
        Self {
            scripts: Mutex::new(scripts.into()),
            live: Mutex::new(None),
            received: Mutex::new(Vec::new()),
            connects,
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Send `event` on the current connection. Returns `false` if none is open.
    pub fn inject(&self, event: ProtocolEvent) -> bool {
        let sender = self.live.lock().expect("lock poisoned").clone();
        sender.is_some_and(|tx| tx.try_send(event).is_ok())
    }

    pub fn connect_count(&self) -> usize {
        *self.connects.borrow()
    }

    pub fn watch_connects(&self) -> watch::Receiver<usize> {
        self.connects.subscribe()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Credentials passed to each `connect`, in order.
    pub fn received_credentials(&self) -> Vec<CredentialState> {
        self.received.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ChatProtocol for ScriptedProtocol {
    async fn connect(&self, credentials: CredentialState) -> SupervisorResult<EventStream> {
        let script = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Script::new(Vec::new()));
        self.received.lock().expect("lock poisoned").push(credentials);

        if let Some(reason) = script.fail {
            self.connects.send_modify(|n| *n += 1);
            return Err(SupervisorError::Protocol(reason));
        }

        let (tx, rx) = mpsc::channel(script.events.len() + 16);
        for event in script.events {
            let _ = tx.try_send(event);
        }
        *self.live.lock().expect("lock poisoned") = script.hold.then_some(tx);
        self.connects.send_modify(|n| *n += 1);
        Ok(rx)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.live.lock().expect("lock poisoned").take();
    }
}

/// [`PairingPresenter`] that remembers what it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    challenges: Mutex<Vec<PairingChallenge>>,
    paired: AtomicUsize,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn challenges(&self) -> Vec<PairingChallenge> {
        self.challenges.lock().expect("lock poisoned").clone()
    }

    pub fn paired_count(&self) -> usize {
        self.paired.load(Ordering::SeqCst)
    }
}

impl PairingPresenter for RecordingPresenter {
    fn present(&self, challenge: &PairingChallenge) {
        self.challenges
            .lock()
            .expect("lock poisoned")
            .push(challenge.clone());
    }

    fn paired(&self) {
        self.paired.fetch_add(1, Ordering::SeqCst);
    }
}
