// crates/chainpulse-core/src/core/snapshot.rs
// ============================================================================
// Module: ChainPulse Market Snapshot Reference
// Description: Audit-only reference to the market data behind an analysis run.
// Purpose: Correlate runs with their inputs without hashing inputs into insights.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The digest is keccak-256 over the RFC 8785 canonical JSON of the snapshot,
//! so key order in the fetched data never changes it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::ContentHash;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;

// ============================================================================
// SECTION: Snapshot Reference
// ============================================================================

/// Reference to a market data snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshotRef {
    /// Source label (for example `defillama`).
    pub source: String,
    /// Capture time in unix milliseconds.
    pub captured_at: u64,
    /// Keccak-256 of the JCS-canonical snapshot.
    pub digest: ContentHash,
}

impl MarketSnapshotRef {
    /// Builds a reference by digesting `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when the snapshot cannot be canonicalized.
    pub fn from_snapshot(
        source: impl Into<String>,
        captured_at: u64,
        snapshot: &Value,
    ) -> Result<Self, HashError> {
        let bytes = canonical_json_bytes(snapshot)?;
        Ok(Self {
            source: source.into(),
            captured_at,
            digest: ContentHash::of(&bytes),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
