use std::sync::Arc;

use chrono::Utc;
use tether_creds::{CredsError, MutationStream};
use tether_sync::{HydrationResult, SyncCoordinator};
use tether_types::{ConnectionState, CredentialState, DisconnectCause};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::presenter::PairingPresenter;
use crate::protocol::{ChatProtocol, ProtocolEvent};
use crate::report::{FinalSyncRecord, SupervisorReport, TerminationReason, Transition};

/// Requests a graceful stop of a running [`ConnectionSupervisor`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

enum CycleEnd {
    Reconnect,
    Terminate(TerminationReason),
}

struct RunState {
    cycles: u32,
    transitions: Vec<Transition>,
    backoff: Backoff,
    pairing_failures: u32,
}

/// Drives the chat connection through its lifecycle.
///
/// Each cycle hydrates local credentials from the remote, connects, and
/// serves protocol events until the connection closes. A transient close
/// restarts the cycle after a backoff delay; a logout or shutdown runs a
/// final sync and terminates. Credential mutations trigger uploads while the
/// connection is open; mutations seen earlier in the cycle are uploaded once
/// it opens.
pub struct ConnectionSupervisor {
    protocol: Arc<dyn ChatProtocol>,
    presenter: Arc<dyn PairingPresenter>,
    coordinator: Arc<SyncCoordinator>,
    config: SupervisorConfig,
    state: watch::Sender<ConnectionState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ConnectionSupervisor {
    pub fn new(
        protocol: Arc<dyn ChatProtocol>,
        presenter: Arc<dyn PairingPresenter>,
        coordinator: Arc<SyncCoordinator>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            protocol,
            presenter,
            coordinator,
            config,
            state,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver of every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Run until logout, shutdown or pairing exhaustion.
    ///
    /// Errors are reserved for local failures (a credential write that
    /// crashed, internal state errors); remote and protocol failures are
    /// handled by the reconnect policy. Every exit, including an error,
    /// publishes [`ConnectionState::Terminated`].
    pub async fn run(&self) -> SupervisorResult<SupervisorReport> {
        let mut run = RunState {
            cycles: 0,
            transitions: Vec::new(),
            backoff: Backoff::new(self.config.backoff.clone()),
            pairing_failures: 0,
        };
        let worker = self.coordinator.spawn_upload_worker();
        let served = self.serve(&mut run).await;
        worker.shutdown().await;

        let reason = match served {
            Ok(reason) => reason,
            Err(err) => {
                error!(error = %err, state = %self.state(), "supervisor failed; terminating");
                if matches!(
                    self.state(),
                    ConnectionState::Connecting | ConnectionState::AwaitingPairing | ConnectionState::Open
                ) {
                    self.protocol.disconnect().await;
                }
                let record = self.final_sync().await;
                warn!(?record, "final sync after failure");
                if let Err(e) = self.enter(&mut run, ConnectionState::Terminated) {
                    debug!(error = %e, "already terminated");
                }
                return Err(err);
            }
        };

        let final_sync = match reason {
            TerminationReason::LoggedOut | TerminationReason::Shutdown => Some(self.final_sync().await),
            TerminationReason::PairingExhausted => None,
        };
        self.enter(&mut run, ConnectionState::Terminated)?;
        info!(?reason, cycles = run.cycles, "supervisor terminated");

        Ok(SupervisorReport {
            cycles: run.cycles,
            reason,
            final_sync,
            transitions: run.transitions,
        })
    }

    async fn serve(&self, run: &mut RunState) -> SupervisorResult<TerminationReason> {
        let mut mutations = self.coordinator.repository().subscribe();
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                return Ok(TerminationReason::Shutdown);
            }
            run.cycles += 1;
            match self.cycle(run, &mut mutations, &mut shutdown).await? {
                CycleEnd::Terminate(reason) => return Ok(reason),
                CycleEnd::Reconnect => {
                    let delay = run.backoff.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, cycle = run.cycles, "waiting before reconnect");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_requested(&mut shutdown) => return Ok(TerminationReason::Shutdown),
                    }
                }
            }
        }
    }

    async fn cycle(
        &self,
        run: &mut RunState,
        mutations: &mut MutationStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SupervisorResult<CycleEnd> {
        // Credentials changed before the connection opened.
        let mut dirty = false;

        self.enter(run, ConnectionState::Hydrating)?;
        match self.coordinator.hydrate().await {
            Ok(HydrationResult::Restored { version, files }) => {
                debug!(version = %version.short_hex(), files, "hydrated from remote");
            }
            Ok(HydrationResult::NotFound) => {}
            Ok(HydrationResult::LocalNewer { version }) => {
                info!(version = %version.short_hex(), "kept unsynced local credentials; uploading once open");
                dirty = true;
            }
            Err(err) => {
                warn!(error = %err, "remote hydration failed; connecting with local credentials");
            }
        }
        if *shutdown.borrow() {
            return Ok(CycleEnd::Terminate(TerminationReason::Shutdown));
        }

        self.enter(run, ConnectionState::Connecting)?;
        let credentials = match self.snapshot().await {
            Ok(credentials) => credentials,
            Err(err) => {
                error!(error = %err, "cannot read local credentials; retrying the cycle");
                return self.closed(run, DisconnectCause::transient(format!("credential snapshot failed: {err}")));
            }
        };
        let mut events = match self.protocol.connect(credentials).await {
            Ok(events) => events,
            Err(err) => return self.closed(run, DisconnectCause::transient(err.to_string())),
        };

        let mut mutations_open = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    self.protocol.disconnect().await;
                    self.enter(run, ConnectionState::Closing)?;
                    return Ok(CycleEnd::Terminate(TerminationReason::Shutdown));
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return self.closed(run, DisconnectCause::transient("event stream ended"));
                    };
                    if let Some(end) = self.handle_event(run, event, &mut dirty).await? {
                        return Ok(end);
                    }
                }
                mutation = mutations.recv(), if mutations_open => match mutation {
                    Ok(_) | Err(RecvError::Lagged(_)) => self.on_mutation(&mut dirty),
                    Err(RecvError::Closed) => mutations_open = false,
                },
            }
        }
    }

    async fn handle_event(
        &self,
        run: &mut RunState,
        event: ProtocolEvent,
        dirty: &mut bool,
    ) -> SupervisorResult<Option<CycleEnd>> {
        let state = self.state();
        match event {
            ProtocolEvent::PairingChallenge(challenge) => match state {
                ConnectionState::Connecting => {
                    self.enter(run, ConnectionState::AwaitingPairing)?;
                    self.presenter.present(&challenge);
                }
                ConnectionState::AwaitingPairing => self.presenter.present(&challenge),
                _ => debug!(state = %state, "ignoring pairing challenge"),
            },
            ProtocolEvent::PairingFailed { reason } => {
                run.pairing_failures += 1;
                warn!(attempt = run.pairing_failures, reason = %reason, "pairing failed");
                if let Some(max) = self.config.max_pairing_attempts {
                    if run.pairing_failures >= max {
                        error!(attempts = run.pairing_failures, "giving up on pairing");
                        self.protocol.disconnect().await;
                        self.enter(run, ConnectionState::Closing)?;
                        return Ok(Some(CycleEnd::Terminate(TerminationReason::PairingExhausted)));
                    }
                }
                if state == ConnectionState::AwaitingPairing {
                    self.enter(run, ConnectionState::Connecting)?;
                }
            }
            ProtocolEvent::ConnectionOpened => {
                if state == ConnectionState::Open {
                    debug!("duplicate open event");
                    return Ok(None);
                }
                self.enter(run, ConnectionState::Open)?;
                run.backoff.reset();
                run.pairing_failures = 0;
                if state == ConnectionState::AwaitingPairing {
                    self.presenter.paired();
                }
                if std::mem::take(dirty) {
                    self.coordinator.trigger_sync_up();
                }
            }
            ProtocolEvent::ConnectionClosed(cause) => return self.closed(run, cause).map(Some),
            ProtocolEvent::CredentialsUpdated { files } => self.persist(files).await?,
        }
        Ok(None)
    }

    fn on_mutation(&self, dirty: &mut bool) {
        if self.state() == ConnectionState::Open {
            self.coordinator.trigger_sync_up();
        } else {
            *dirty = true;
        }
    }

    fn closed(&self, run: &mut RunState, cause: DisconnectCause) -> SupervisorResult<CycleEnd> {
        self.enter(run, ConnectionState::Closing)?;
        if cause.is_terminal() {
            info!(cause = %cause, "session ended; not reconnecting");
            return Ok(CycleEnd::Terminate(TerminationReason::LoggedOut));
        }
        info!(cause = %cause, "connection lost; restarting cycle");
        self.enter(run, ConnectionState::Idle)?;
        Ok(CycleEnd::Reconnect)
    }

    async fn persist(&self, files: Vec<(String, Vec<u8>)>) -> SupervisorResult<()> {
        let repo = Arc::clone(self.coordinator.repository());
        let written = tokio::task::spawn_blocking(move || {
            for (name, content) in &files {
                repo.store_entry(name, content)?;
            }
            Ok::<_, CredsError>(files.len())
        })
        .await
        .map_err(|e| SupervisorError::Task(e.to_string()))?;

        match written {
            Ok(count) => debug!(files = count, "credential update persisted"),
            Err(err) => error!(error = %err, "failed to persist credential update"),
        }
        Ok(())
    }

    async fn snapshot(&self) -> SupervisorResult<CredentialState> {
        let repo = Arc::clone(self.coordinator.repository());
        let state = tokio::task::spawn_blocking(move || repo.snapshot())
            .await
            .map_err(|e| SupervisorError::Task(e.to_string()))??;
        Ok(state)
    }

    async fn final_sync(&self) -> FinalSyncRecord {
        match self.coordinator.final_sync().await {
            Ok(outcome) => outcome.into(),
            Err(err) => FinalSyncRecord::Failed {
                error: err.to_string(),
            },
        }
    }

    fn enter(&self, run: &mut RunState, next: ConnectionState) -> SupervisorResult<()> {
        let from = self.state();
        let to = from.transition(next)?;
        self.state.send_replace(to);
        run.transitions.push(Transition {
            from,
            to,
            at: Utc::now(),
        });
        info!(from = %from, state = %to, "connection state changed");
        Ok(())
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}
