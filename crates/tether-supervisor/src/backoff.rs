use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnect delay settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

/// Bounded exponential backoff between transient reconnects.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    next_ms: u64,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let next_ms = config.initial_ms.min(config.max_ms);
        Self { config, next_ms }
    }

    /// Delay before the next reconnect; grows the one after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next_ms;
        let grown = (delay as f64 * self.config.multiplier.max(1.0)).ceil();
        self.next_ms = if grown.is_finite() && grown < self.config.max_ms as f64 {
            grown as u64
        } else {
            self.config.max_ms
        };
        Duration::from_millis(delay)
    }

    /// Back to the initial delay, after a connection reached `Open`.
    pub fn reset(&mut self) {
        self.next_ms = self.config.initial_ms.min(self.config.max_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn grows_and_caps() {
        let mut b = Backoff::new(BackoffConfig {
            initial_ms: 100,
            max_ms: 1_000,
            multiplier: 3.0,
        });
        let delays: Vec<_> = (0..5).map(|_| b.next_delay()).collect();
        assert_eq!(delays, vec![ms(100), ms(300), ms(900), ms(1_000), ms(1_000)]);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut b = Backoff::new(BackoffConfig::default());
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), ms(1_000));
    }

    #[test]
    fn multiplier_below_one_does_not_shrink() {
        let mut b = Backoff::new(BackoffConfig {
            initial_ms: 50,
            max_ms: 500,
            multiplier: 0.5,
        });
        assert_eq!(b.next_delay(), ms(50));
        assert_eq!(b.next_delay(), ms(50));
    }
}
