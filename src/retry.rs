//! Bounded retry with escalating backoff for failing sectors.
//!
//! Drives that hit a bad spot often recover if they are given a moment
//! before the next attempt. The tracker counts consecutive failures at one
//! sector and, once a threshold is reached, asks the caller to pause for a
//! delay that doubles on each further pause, up to a cap.

use std::time::Duration;

use crate::{constants::DEFAULT_MAX_RETRIES, types::Lsn};

/// Consecutive failures at one sector before pausing.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

/// Default pause after reaching the threshold (milliseconds).
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 50;

/// Longest pause (milliseconds).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Resolve a user-facing retry count: negative disables, zero means default.
#[must_use]
pub fn effective_retries(max_retries: i32) -> u32 {
    match max_retries {
        n if n < 0 => 0,
        0 => DEFAULT_MAX_RETRIES,
        n => n.unsigned_abs(),
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Try again right away
    Retry,
    /// Wait, then try again
    Backoff(Duration),
    /// Retries exhausted
    GiveUp,
}

/// Per-sector retry bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    error_threshold: u32,
    base_delay: Duration,
    delay: Duration,
    sector: Option<Lsn>,
    attempts: u32,
    consecutive: u32,
    total_errors: u64,
    total_backoffs: u64,
}

impl RetryTracker {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            base_delay,
            delay: base_delay,
            sector: None,
            attempts: 0,
            consecutive: 0,
            total_errors: 0,
            total_backoffs: 0,
        }
    }

    /// Record a failed attempt at `sector` and decide what comes next.
    pub fn record_error(&mut self, sector: Lsn) -> RetryAction {
        self.total_errors += 1;

        if self.sector != Some(sector) {
            self.reset();
            self.sector = Some(sector);
        }

        self.attempts += 1;
        if self.attempts > self.max_retries {
            return RetryAction::GiveUp;
        }

        self.consecutive += 1;
        if self.consecutive < self.error_threshold {
            return RetryAction::Retry;
        }

        self.consecutive = 0;
        self.total_backoffs += 1;
        let pause = self.delay;
        self.delay = (self.delay * 2).min(Duration::from_millis(MAX_BACKOFF_DELAY_MS));
        RetryAction::Backoff(pause)
    }

    /// Record a successful read; failures behind us no longer count.
    pub fn record_success(&mut self, sector: Lsn) {
        if self.sector.is_some_and(|s| sector >= s) {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.sector = None;
        self.attempts = 0;
        self.consecutive = 0;
        self.delay = self.base_delay;
    }

    /// Attempts made at the current sector, including the first.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    #[must_use]
    pub fn total_backoffs(&self) -> u64 {
        self.total_backoffs
    }
}
