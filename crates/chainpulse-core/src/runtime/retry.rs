// crates/chainpulse-core/src/runtime/retry.rs
// ============================================================================
// Module: ChainPulse Ledger Call Policy
// Description: Bounded timeouts for ledger calls and retry with backoff for reads.
// Purpose: Treat a silent ledger as a failure instead of a hang.
// Dependencies: tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! Every ledger call runs under a deadline. Reads are side-effect-free and may
//! be retried with exponential backoff when the ledger is unreachable or slow.
//! Writes go through [`bounded_write`], which never retries: a repeated batch
//! without idempotency protection would double-count prediction ids.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::interfaces::LedgerClientError;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Default read deadline.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default write deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default read retry count.
pub const DEFAULT_READ_RETRIES: u32 = 2;
/// Default initial backoff.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Deadlines and retry settings for ledger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCallPolicy {
    /// Deadline per read attempt.
    pub read_timeout: Duration,
    /// Deadline for a write, including finalization.
    pub write_timeout: Duration,
    /// Additional read attempts after the first.
    pub read_retries: u32,
    /// Backoff before the first retry; doubles per retry.
    pub retry_backoff: Duration,
}

impl Default for LedgerCallPolicy {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_retries: DEFAULT_READ_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl LedgerCallPolicy {
    /// Returns the backoff before retry number `attempt` (zero-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure of a bounded ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerCallError {
    /// The call exceeded its deadline.
    #[error("ledger call timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    /// The client reported an error.
    #[error(transparent)]
    Client(#[from] LedgerClientError),
}

impl LedgerCallError {
    /// Returns true when a read may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Client(err) => err.is_retryable(),
        }
    }
}

// ============================================================================
// SECTION: Call Helpers
// ============================================================================

/// Runs a read under the read deadline, retrying transient failures.
///
/// # Errors
///
/// Returns the last [`LedgerCallError`] once retries are exhausted, or the first
/// non-retryable error immediately.
pub async fn bounded_read<T, F, Fut>(policy: &LedgerCallPolicy, mut call: F) -> Result<T, LedgerCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerClientError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.read_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => LedgerCallError::Client(err),
            Err(_) => LedgerCallError::Timeout(policy.read_timeout),
        };
        if !result.is_retryable() || attempt >= policy.read_retries {
            return Err(result);
        }
        tokio::time::sleep(policy.backoff_for(attempt)).await;
        attempt += 1;
    }
}

/// Runs a write under the write deadline. Never retries.
///
/// # Errors
///
/// Returns [`LedgerCallError::Timeout`] when the deadline passes, otherwise the
/// client error.
pub async fn bounded_write<T, Fut>(policy: &LedgerCallPolicy, call: Fut) -> Result<T, LedgerCallError>
where
    Fut: Future<Output = Result<T, LedgerClientError>>,
{
    match tokio::time::timeout(policy.write_timeout, call).await {
        Ok(result) => result.map_err(LedgerCallError::Client),
        Err(_) => Err(LedgerCallError::Timeout(policy.write_timeout)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwrap/expect for clarity."
    )]

    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    fn fast_policy(retries: u32) -> LedgerCallPolicy {
        LedgerCallPolicy {
            read_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(50),
            read_retries: retries,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = fast_policy(3);
        assert_eq!(policy.backoff_for(0), Duration::from_millis(1));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(8));
    }

    #[tokio::test]
    async fn read_retries_unreachable_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = bounded_read(&fast_policy(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err(LedgerClientError::Unreachable("down".to_string())) } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = bounded_read(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerClientError::NotFound(9)) }
        })
        .await;
        assert_eq!(result, Err(LedgerCallError::Client(LedgerClientError::NotFound(9))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_times_out_without_retry() {
        let result: Result<(), _> = bounded_write(&fast_policy(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(LedgerCallError::Timeout(Duration::from_millis(50))));
    }
}
