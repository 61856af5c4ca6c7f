use crate::backoff::BackoffConfig;
use crate::error::{SupervisorError, SupervisorResult};

/// Supervisor settings.
#[derive(Clone, Debug, Default)]
pub struct SupervisorConfig {
    pub backoff: BackoffConfig,
    /// Terminate after this many consecutive failed pairing attempts.
    /// `None` keeps offering new challenges forever.
    pub max_pairing_attempts: Option<u32>,
}

impl SupervisorConfig {
    /// Reject settings that would hot-loop or never let pairing start.
    pub fn validate(&self) -> SupervisorResult<()> {
        let invalid = |msg: &str| Err(SupervisorError::InvalidConfig(msg.to_string()));
        let backoff = &self.backoff;
        if backoff.initial_ms == 0 {
            return invalid("backoff.initial_ms must be greater than zero");
        }
        if backoff.max_ms < backoff.initial_ms {
            return invalid("backoff.max_ms must be at least backoff.initial_ms");
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return invalid("backoff.multiplier must be a finite number >= 1");
        }
        if self.max_pairing_attempts == Some(0) {
            return invalid("max_pairing_attempts must be at least 1");
        }
        Ok(())
    }
}
