//! Connection supervisor for tether.
//!
//! Drives the chat client through an explicit lifecycle:
//!
//! ```text
//! Idle -> Hydrating -> Connecting -> (AwaitingPairing) -> Open -> Closing
//!   ^                                                               |
//!   +--------------- transient disconnect, after backoff -----------+
//!                                                                   |
//!                     logged out / shutdown -> final sync -> Terminated
//! ```
//!
//! The chat protocol and the pairing display are collaborators behind the
//! [`ChatProtocol`] and [`PairingPresenter`] traits. [`testing`] has
//! scripted versions of both.
//!
//! This crate is meant to be embedded by the bot process that owns a
//! [`ChatProtocol`] implementation; the `tether` binary only performs
//! one-shot sync operations. An embedding looks like:
//!
//! ```text
//! let config = tether_config.supervisor_config()?;      // validated
//! let supervisor = ConnectionSupervisor::new(
//!     Arc::new(my_protocol),
//!     Arc::new(TerminalPresenter::new()),
//!     coordinator,
//!     config,
//! );
//! let report = supervisor.run().await?;
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod presenter;
pub mod protocol;
pub mod report;
pub mod supervisor;
pub mod testing;

pub use backoff::{Backoff, BackoffConfig};
pub use config::SupervisorConfig;
pub use error::{SupervisorError, SupervisorResult};
pub use presenter::{PairingPresenter, TerminalPresenter};
pub use protocol::{ChatProtocol, EventStream, ProtocolEvent};
pub use report::{FinalSyncRecord, SupervisorReport, TerminationReason, Transition};
pub use supervisor::{ConnectionSupervisor, ShutdownHandle};
