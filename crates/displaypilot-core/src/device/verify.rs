//! Verification and retry policy
//!
//! Display write-acknowledgements are unreliable proxies for true device
//! state, so drivers re-query after a write until the reported value matches
//! the requested one, bounded by an attempt budget. The same bounded-attempt
//! bookkeeping covers timeout retries, keyed by command identity.

use std::collections::HashMap;
use tracing::warn;

/// Result of checking an observed value against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Observed value matches; verification complete.
    Confirmed,
    /// Mismatch with attempts remaining; re-issue the query.
    Retry,
    /// Mismatch and the attempt budget is spent; give up.
    Exhausted,
}

/// One in-progress write verification: the value the device should report
/// and how many more mismatches will be tolerated.
#[derive(Debug, Clone)]
pub struct VerifyRetry<T> {
    expected: T,
    attempts: u8,
    max_attempts: u8,
}

impl<T: PartialEq> VerifyRetry<T> {
    /// Begin verifying that the device will report `expected`, allowing up
    /// to `max_attempts` mismatched observations.
    pub fn new(expected: T, max_attempts: u8) -> Self {
        Self {
            expected,
            attempts: 0,
            max_attempts,
        }
    }

    /// The value the device is expected to report.
    pub fn expected(&self) -> &T {
        &self.expected
    }

    /// Check an observed value.
    pub fn observe(&mut self, actual: &T) -> VerifyOutcome {
        if *actual == self.expected {
            return VerifyOutcome::Confirmed;
        }
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            VerifyOutcome::Exhausted
        } else {
            VerifyOutcome::Retry
        }
    }
}

/// Capped retry counter keyed by command identity.
///
/// `should_retry` counts an attempt and answers whether another send is
/// allowed; a successful response resets the command's count.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_attempts: u8,
    counts: HashMap<String, u8>,
}

impl RetryTracker {
    /// Allow up to `max_attempts` retries per command identity.
    pub fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts,
            counts: HashMap::new(),
        }
    }

    /// Record a failed attempt for `identity`; `true` while the cap allows
    /// another send. Logs once when the command is abandoned.
    pub fn should_retry(&mut self, identity: &str) -> bool {
        let count = self.counts.entry(identity.to_string()).or_insert(0);
        *count += 1;
        if *count > self.max_attempts {
            warn!(command = identity, attempts = *count, "retries exhausted, abandoning command");
            self.counts.remove(identity);
            return false;
        }
        true
    }

    /// Clear the count for `identity` after a successful response.
    pub fn reset(&mut self, identity: &str) {
        self.counts.remove(identity);
    }

    /// Forget all counts (used when the link is replaced).
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
