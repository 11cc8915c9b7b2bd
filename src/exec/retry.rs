// src/exec/retry.rs

//! Error classification and bounded retry with exponential backoff.

use std::io::{self, ErrorKind};
use std::time::Duration;

use tracing::debug;

/// How an I/O failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Busy, locked or temporarily unavailable: worth retrying.
    Transient,
    /// Permission denied, disk full, missing parent and the like.
    Permanent,
}

/// Classify by the first `io::Error` in the chain. Errors without one are
/// permanent.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(|io| classify_kind(io.kind()))
        .unwrap_or(ErrorClass::Permanent)
}

pub fn classify_kind(kind: ErrorKind) -> ErrorClass {
    match kind {
        ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut
        | ErrorKind::ResourceBusy
        | ErrorKind::ExecutableFileBusy => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of
    /// attempts. Blocks the calling thread between attempts, so call it from
    /// a blocking context.
    ///
    /// Returns the final result and the number of attempts made.
    pub fn run<T, F>(&self, mut op: F) -> (anyhow::Result<T>, u32)
    where
        F: FnMut() -> anyhow::Result<T>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return (Ok(value), attempt),
                Err(err) => {
                    if attempt >= max || classify(&err) == ErrorClass::Permanent {
                        return (Err(err), attempt);
                    }
                    let delay = self.delay_for(attempt);
                    debug!(attempt, ?delay, error = %format!("{:#}", err), "transient failure, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
