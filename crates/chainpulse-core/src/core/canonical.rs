// crates/chainpulse-core/src/core/canonical.rs
// ============================================================================
// Module: ChainPulse Canonicalizer
// Description: Versioned canonical byte encodings of insight drafts.
// Purpose: Produce the exact bytes hashed at commit time and re-hashed at verify time.
// Dependencies: serde, serde_json, serde_jcs
// ============================================================================

//! ## Overview
//! Two encodings exist and neither may ever change:
//! - `v1`: compact JSON with keys in the order `category, title, summary,
//!   fullAnalysis, sentimentScore, confidence, dataPoints`. Only `"`, `\` and
//!   control characters are escaped. Hashes produced by earlier deployments
//!   were computed over exactly these bytes.
//! - `v2`: RFC 8785 (JCS) canonical JSON over the same seven fields.
//!
//! Every stored insight records its version and verification always re-encodes
//! with that version. Both encodings are pure functions of the draft.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::ContentHash;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::insight::InsightDraft;

// ============================================================================
// SECTION: Version
// ============================================================================

/// Canonical encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalVersion {
    /// Ordered compact JSON.
    #[default]
    V1,
    /// RFC 8785 canonical JSON.
    V2,
}

impl CanonicalVersion {
    /// Returns the stable label (`v1` or `v2`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl fmt::Display for CanonicalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CanonicalVersion {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(HashError::Canonicalization(format!("unknown canonical version: {other}"))),
        }
    }
}

// ============================================================================
// SECTION: Canonical Field Set
// ============================================================================

/// Borrowed view of the hashed field set in v1 key order.
///
/// Kept separate from [`InsightDraft`] so the draft type can evolve without
/// moving the hashed bytes.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    /// Category string as received.
    category: &'a str,
    /// Headline.
    title: &'a str,
    /// Summary.
    summary: &'a str,
    /// Long-form analysis.
    #[serde(rename = "fullAnalysis")]
    full_analysis: &'a str,
    /// Sentiment score.
    #[serde(rename = "sentimentScore")]
    sentiment_score: i64,
    /// Confidence.
    confidence: i64,
    /// Data points.
    #[serde(rename = "dataPoints")]
    data_points: &'a [String],
}

impl<'a> CanonicalFields<'a> {
    /// Borrows the hashed fields from a draft.
    fn of(draft: &'a InsightDraft) -> Self {
        Self {
            category: &draft.category,
            title: &draft.title,
            summary: &draft.summary,
            full_analysis: &draft.full_analysis,
            sentiment_score: draft.sentiment_score,
            confidence: draft.confidence,
            data_points: &draft.data_points,
        }
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Returns the canonical bytes of `draft` under `version`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_bytes(draft: &InsightDraft, version: CanonicalVersion) -> Result<Vec<u8>, HashError> {
    let fields = CanonicalFields::of(draft);
    match version {
        CanonicalVersion::V1 => {
            serde_json::to_vec(&fields).map_err(|err| HashError::Canonicalization(err.to_string()))
        }
        CanonicalVersion::V2 => canonical_json_bytes(&fields),
    }
}

/// Returns the canonical content as a UTF-8 string (the ledger's `content` argument).
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails or yields invalid UTF-8.
pub fn canonical_string(draft: &InsightDraft, version: CanonicalVersion) -> Result<String, HashError> {
    let bytes = canonical_bytes(draft, version)?;
    String::from_utf8(bytes).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Computes the keccak-256 content hash of `draft` under `version`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn content_hash(draft: &InsightDraft, version: CanonicalVersion) -> Result<ContentHash, HashError> {
    let bytes = canonical_bytes(draft, version)?;
    Ok(ContentHash::of(&bytes))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
