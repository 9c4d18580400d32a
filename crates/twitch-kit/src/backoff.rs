//! Reconnect bookkeeping shared by the IRC and PubSub connection loops.

use std::time::{Duration, Instant};

use crate::TwitchError;

const BASE_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const FAILURE_RESET_WINDOW: Duration = Duration::from_secs(5 * 60);
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// Consecutive failure counter with exponential backoff.
#[derive(Debug, Default)]
pub(crate) struct Reconnect {
    failures: u32,
    last_failure_at: Option<Instant>,
}

impl Reconnect {
    /// Forget old failures once the connection has been stable for a while.
    pub(crate) fn reset_if_stable(&mut self, source: &'static str) {
        if let Some(last_failure) = self.last_failure_at {
            if last_failure.elapsed() >= FAILURE_RESET_WINDOW {
                if self.failures > 0 {
                    tracing::info!(source, failures = self.failures, "Failures reset after stable interval");
                }
                self.failures = 0;
                self.last_failure_at = None;
            }
        }
    }

    pub(crate) fn succeeded(&mut self) {
        self.failures = 0;
    }

    /// Record a failure. Returns the delay before the next attempt, or `None`
    /// once the loop should give up.
    pub(crate) fn failed(&mut self) -> Option<Duration> {
        self.failures += 1;
        self.last_failure_at = Some(Instant::now());
        if self.failures >= MAX_CONSECUTIVE_FAILURES {
            return None;
        }
        Some(backoff_duration(self.failures))
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

pub(crate) fn backoff_duration(failures: u32) -> Duration {
    let d = BASE_BACKOFF * 2u32.saturating_pow(failures.saturating_sub(1));
    d.min(MAX_BACKOFF)
}

pub(crate) fn is_auth_error(error: &TwitchError) -> bool {
    matches!(
        error,
        TwitchError::ApiError {
            status: 401 | 403,
            ..
        } | TwitchError::AuthRequired
    )
}
