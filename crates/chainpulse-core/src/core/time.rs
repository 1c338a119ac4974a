// crates/chainpulse-core/src/core/time.rs
// ============================================================================
// Module: ChainPulse Time Model
// Description: Ledger commit timestamps and RFC 3339 helpers.
// Purpose: Keep the ledger and pipeline deterministic by taking time from hosts.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The ledger state machine never reads the wall clock. Hosts pass a
//! [`Timestamp`] (unix seconds) into every write; off-chain records carry
//! RFC 3339 strings derived from host-supplied unix milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Ledger commit time in unix seconds.
///
/// # Invariants
/// - Supplied by the host; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Creates a timestamp from unix milliseconds (truncating).
    #[must_use]
    pub const fn from_unix_millis(millis: u64) -> Self {
        Self(millis / 1000)
    }

    /// Returns unix seconds.
    #[must_use]
    pub const fn as_unix_secs(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: RFC 3339 Helpers
// ============================================================================

/// Formats unix milliseconds as an RFC 3339 UTC string.
///
/// Returns `None` when the value is outside the representable date range.
#[must_use]
pub fn rfc3339_from_unix_millis(millis: u64) -> Option<String> {
    let nanos = i128::from(millis).checked_mul(1_000_000)?;
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    datetime.format(&Rfc3339).ok()
}

/// Parses an RFC 3339 string into unix milliseconds.
///
/// Returns `None` for malformed input or pre-epoch instants.
#[must_use]
pub fn unix_millis_from_rfc3339(value: &str) -> Option<u64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    u64::try_from(datetime.unix_timestamp_nanos() / 1_000_000).ok()
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

    use super::*;

    #[test]
    fn rfc3339_round_trips_millis() {
        let text = rfc3339_from_unix_millis(1_700_000_000_123).unwrap();
        assert_eq!(text, "2023-11-14T22:13:20.123Z");
        assert_eq!(unix_millis_from_rfc3339(&text), Some(1_700_000_000_123));
    }

    #[test]
    fn timestamp_truncates_millis() {
        assert_eq!(Timestamp::from_unix_millis(1_999).as_unix_secs(), 1);
    }
}
