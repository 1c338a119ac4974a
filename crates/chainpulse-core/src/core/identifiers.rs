// crates/chainpulse-core/src/core/identifiers.rs
// ============================================================================
// Module: ChainPulse Identifiers
// Description: Ledger identities, prediction indices, and local insight ids.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque on the wire. [`Address`] is a 20-byte ledger identity
//! rendered as `0x`-prefixed lowercase hex. [`PredictionId`] is the zero-based
//! ledger index assigned in insertion order. [`InsightId`] is the locally
//! generated key of an off-chain insight record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::core::hashing::HashError;
use crate::core::hashing::decode_hex_fixed;
use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Address
// ============================================================================

/// 20-byte ledger identity (owner, agent, or signer).
///
/// # Invariants
/// - Renders as `0x` + 40 lowercase hex characters.
/// - The zero address is representable but never accepted as an owner or agent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Wraps raw address bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true for the all-zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Returns the `0x`-prefixed lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex_encode(&self.0))
    }

    /// Parses a hex address with or without the `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the input is not 20 bytes of hex.
    pub fn parse_hex(value: &str) -> Result<Self, HashError> {
        decode_hex_fixed::<20>(value).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(value)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_hex(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Prediction Identifier
// ============================================================================

/// Zero-based ledger index of a committed prediction.
///
/// # Invariants
/// - Equal to the record's insertion position; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionId(u64);

impl PredictionId {
    /// Creates a prediction identifier from a raw index.
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PredictionId {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

// ============================================================================
// SECTION: Insight Identifier
// ============================================================================

/// Locally generated insight identifier (`"{unix_millis}-{index}"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsightId(String);

impl InsightId {
    /// Creates an insight identifier from an arbitrary string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the identifier for the `index`-th insight of a run started at `unix_millis`.
    #[must_use]
    pub fn for_run(unix_millis: u64, index: usize) -> Self {
        Self(format!("{unix_millis}-{index}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InsightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InsightId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InsightId {
    fn from(value: String) -> Self {
        Self(value)
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

    use super::*;

    #[test]
    fn address_parses_mixed_case_and_renders_lowercase() {
        let address = Address::parse_hex("0xAbCdEf0000000000000000000000000000000001").unwrap();
        assert_eq!(address.to_hex(), "0xabcdef0000000000000000000000000000000001");
        assert!(!address.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let address = Address::from_bytes([0x11; 20]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert!(serde_json::from_str::<Address>("\"0x1234\"").is_err());
    }

    #[test]
    fn insight_id_for_run_formats_millis_and_index() {
        assert_eq!(InsightId::for_run(1_700_000_000_000, 3).as_str(), "1700000000000-3");
    }
}
