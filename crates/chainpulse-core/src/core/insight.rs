// crates/chainpulse-core/src/core/insight.rs
// ============================================================================
// Module: ChainPulse Insight Model
// Description: Generator drafts, schema validation, and committed insight records.
// Purpose: Define the off-chain insight shapes and their fail-closed bounds.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`InsightDraft`] is what the external generator hands the pipeline. It is
//! validated against fixed bounds before anything is hashed. An [`AIInsight`] is
//! the draft plus its content hash, local id, creation time and, once the
//! ledger commit has finalized, its prediction id and transaction reference.
//!
//! Character bounds count Unicode scalar values, not bytes. The ledger enforces
//! its own byte bound on summaries at insertion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::canonical::CanonicalVersion;
use crate::core::category::Category;
use crate::core::hashing::ContentHash;
use crate::core::hashing::TxHash;
use crate::core::identifiers::InsightId;
use crate::core::identifiers::PredictionId;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 80;
/// Maximum summary length in characters.
pub const MAX_SUMMARY_CHARS: usize = 200;
/// Maximum full analysis length in characters.
pub const MAX_FULL_ANALYSIS_CHARS: usize = 5000;
/// Maximum number of data points per draft.
pub const MAX_DATA_POINTS: usize = 20;
/// Maximum length of a single data point in characters.
pub const MAX_DATA_POINT_CHARS: usize = 200;
/// Inclusive sentiment bounds.
pub const SENTIMENT_RANGE: (i64, i64) = (-100, 100);
/// Inclusive confidence bounds.
pub const CONFIDENCE_RANGE: (i64, i64) = (0, 100);
/// Minimum drafts in a generator response.
pub const MIN_RESPONSE_INSIGHTS: usize = 1;
/// Maximum drafts in a generator response.
pub const MAX_RESPONSE_INSIGHTS: usize = 5;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema validation failures for drafts and generator responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Category string is not one of the known names.
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    /// A string field exceeds its character bound.
    #[error("{field} too long: {actual} > {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed characters.
        max: usize,
        /// Actual characters.
        actual: usize,
    },
    /// An integer field is outside its inclusive range.
    #[error("{field} out of range: {value} not in {min}..={max}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Inclusive minimum.
        min: i64,
        /// Inclusive maximum.
        max: i64,
        /// Actual value.
        value: i64,
    },
    /// Too many data points.
    #[error("too many data points: {actual} > {max}")]
    TooManyDataPoints {
        /// Maximum allowed entries.
        max: usize,
        /// Actual entries.
        actual: usize,
    },
    /// Batch or response size is outside its bounds.
    #[error("batch size {actual} not in {min}..={max}")]
    BatchSize {
        /// Inclusive minimum.
        min: usize,
        /// Inclusive maximum.
        max: usize,
        /// Actual size.
        actual: usize,
    },
    /// Generator output could not be parsed.
    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

// ============================================================================
// SECTION: Insight Draft
// ============================================================================

/// Analysis draft produced by the external generator.
///
/// # Invariants
/// - `category` holds the string exactly as received; canonical bytes hash that text.
/// - Field order is the v1 canonical order and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightDraft {
    /// Category name as emitted by the generator.
    pub category: String,
    /// Short headline.
    pub title: String,
    /// One-paragraph summary, also committed on the ledger.
    pub summary: String,
    /// Long-form analysis text.
    pub full_analysis: String,
    /// Sentiment score in -100..=100.
    pub sentiment_score: i64,
    /// Confidence in 0..=100.
    pub confidence: i64,
    /// Supporting data points (required, possibly empty).
    pub data_points: Vec<String>,
}

impl InsightDraft {
    /// Validates the draft against the schema bounds and maps its category.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for the first violated bound.
    pub fn validate(&self) -> Result<Category, SchemaError> {
        let category = self.category_code()?;
        check_chars("title", &self.title, MAX_TITLE_CHARS)?;
        check_chars("summary", &self.summary, MAX_SUMMARY_CHARS)?;
        check_chars("fullAnalysis", &self.full_analysis, MAX_FULL_ANALYSIS_CHARS)?;
        check_range("sentimentScore", self.sentiment_score, SENTIMENT_RANGE)?;
        check_range("confidence", self.confidence, CONFIDENCE_RANGE)?;
        if self.data_points.len() > MAX_DATA_POINTS {
            return Err(SchemaError::TooManyDataPoints {
                max: MAX_DATA_POINTS,
                actual: self.data_points.len(),
            });
        }
        for point in &self.data_points {
            check_chars("dataPoints[]", point, MAX_DATA_POINT_CHARS)?;
        }
        Ok(category)
    }

    /// Maps the category string without checking other bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownCategory`] when the name is not recognized.
    pub fn category_code(&self) -> Result<Category, SchemaError> {
        Category::parse(&self.category)
            .map_err(|_| SchemaError::UnknownCategory(self.category.clone()))
    }

    /// Returns the sentiment as the ledger's signed byte.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::OutOfRange`] when the score does not fit the ledger range.
    pub fn ledger_sentiment(&self) -> Result<i8, SchemaError> {
        check_range("sentimentScore", self.sentiment_score, SENTIMENT_RANGE)?;
        i8::try_from(self.sentiment_score).map_err(|_| SchemaError::OutOfRange {
            field: "sentimentScore",
            min: SENTIMENT_RANGE.0,
            max: SENTIMENT_RANGE.1,
            value: self.sentiment_score,
        })
    }
}

/// Checks a string field against a character bound.
fn check_chars(field: &'static str, value: &str, max: usize) -> Result<(), SchemaError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(SchemaError::TooLong {
            field,
            max,
            actual,
        });
    }
    Ok(())
}

/// Checks an integer field against an inclusive range.
const fn check_range(field: &'static str, value: i64, range: (i64, i64)) -> Result<(), SchemaError> {
    if value < range.0 || value > range.1 {
        return Err(SchemaError::OutOfRange {
            field,
            min: range.0,
            max: range.1,
            value,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Analysis Response
// ============================================================================

/// Generator output envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Drafts in generator order.
    pub insights: Vec<InsightDraft>,
}

/// Parses and validates a generator response (`{"insights": [...]}`).
///
/// # Errors
///
/// Returns [`SchemaError`] when the JSON is malformed, the draft count is not
/// 1..=5, or any draft violates its bounds.
pub fn parse_analysis_response(text: &str) -> Result<Vec<InsightDraft>, SchemaError> {
    let response: AnalysisResponse =
        serde_json::from_str(text).map_err(|err| SchemaError::Malformed(err.to_string()))?;
    let count = response.insights.len();
    if !(MIN_RESPONSE_INSIGHTS ..= MAX_RESPONSE_INSIGHTS).contains(&count) {
        return Err(SchemaError::BatchSize {
            min: MIN_RESPONSE_INSIGHTS,
            max: MAX_RESPONSE_INSIGHTS,
            actual: count,
        });
    }
    for draft in &response.insights {
        draft.validate()?;
    }
    Ok(response.insights)
}

// ============================================================================
// SECTION: AI Insight
// ============================================================================

/// Off-chain insight record.
///
/// # Invariants
/// - `prediction_id` and `tx_hash` are set only after a finalized ledger commit.
/// - `canonical_version` names the encoding that produced `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIInsight {
    /// Locally generated identifier.
    pub id: InsightId,
    /// Draft content exactly as hashed.
    #[serde(flatten)]
    pub draft: InsightDraft,
    /// Keccak-256 of the canonical bytes.
    pub content_hash: ContentHash,
    /// Creation time (RFC 3339 UTC).
    pub created_at: String,
    /// Canonical encoding version used for `content_hash`.
    #[serde(default)]
    pub canonical_version: CanonicalVersion,
    /// Transaction reference of the commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// Ledger index of the committed prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<PredictionId>,
}

impl AIInsight {
    /// Returns true once the insight carries ledger references.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.prediction_id.is_some() && self.tx_hash.is_some()
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

    fn draft() -> InsightDraft {
        InsightDraft {
            category: "RISK".to_string(),
            title: "X".to_string(),
            summary: "Y".to_string(),
            full_analysis: "Z".to_string(),
            sentiment_score: -40,
            confidence: 70,
            data_points: Vec::new(),
        }
    }

    #[test]
    fn valid_draft_maps_category() {
        assert_eq!(draft().validate().unwrap(), Category::Risk);
        assert_eq!(draft().ledger_sentiment().unwrap(), -40);
    }

    #[test]
    fn bounds_are_enforced_in_characters() {
        let mut long_title = draft();
        long_title.title = "é".repeat(80);
        assert!(long_title.validate().is_ok());
        long_title.title.push('é');
        assert!(matches!(
            long_title.validate(),
            Err(SchemaError::TooLong { field: "title", max: 80, actual: 81 })
        ));

        let mut sentiment = draft();
        sentiment.sentiment_score = 101;
        assert!(matches!(sentiment.validate(), Err(SchemaError::OutOfRange { .. })));

        let mut confidence = draft();
        confidence.confidence = -1;
        assert!(matches!(confidence.validate(), Err(SchemaError::OutOfRange { .. })));

        let mut points = draft();
        points.data_points = vec!["p".to_string(); 21];
        assert!(matches!(points.validate(), Err(SchemaError::TooManyDataPoints { .. })));
    }

    #[test]
    fn unknown_category_is_schema_error() {
        let mut unknown = draft();
        unknown.category = "UNKNOWN_CATEGORY".to_string();
        assert_eq!(
            unknown.validate(),
            Err(SchemaError::UnknownCategory("UNKNOWN_CATEGORY".to_string()))
        );
    }

    #[test]
    fn response_requires_one_to_five_drafts() {
        let one = serde_json::json!({ "insights": [draft()] }).to_string();
        assert_eq!(parse_analysis_response(&one).unwrap().len(), 1);

        let empty = serde_json::json!({ "insights": [] }).to_string();
        assert!(matches!(parse_analysis_response(&empty), Err(SchemaError::BatchSize { .. })));

        let six = serde_json::json!({ "insights": vec![draft(); 6] }).to_string();
        assert!(matches!(parse_analysis_response(&six), Err(SchemaError::BatchSize { .. })));

        assert!(matches!(parse_analysis_response("not json"), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn data_points_field_is_required() {
        let mut value = serde_json::to_value(draft()).unwrap();
        value.as_object_mut().unwrap().remove("dataPoints");
        let missing = serde_json::json!({ "insights": [value] }).to_string();
        assert!(matches!(parse_analysis_response(&missing), Err(SchemaError::Malformed(_))));

        let empty = serde_json::json!({ "insights": [draft()] }).to_string();
        assert!(parse_analysis_response(&empty).unwrap()[0].data_points.is_empty());
    }

    #[test]
    fn legacy_insight_without_version_defaults_to_v1() {
        let json = serde_json::json!({
            "id": "1700000000000-0",
            "category": "TREND",
            "title": "t",
            "summary": "s",
            "fullAnalysis": "f",
            "sentimentScore": 10,
            "confidence": 50,
            "dataPoints": ["a"],
            "contentHash": format!("0x{}", "ab".repeat(32)),
            "createdAt": "2024-01-01T00:00:00Z",
            "predictionId": 7,
            "txHash": format!("0x{}", "cd".repeat(32)),
        });
        let insight: AIInsight = serde_json::from_value(json).unwrap();
        assert_eq!(insight.canonical_version, CanonicalVersion::V1);
        assert_eq!(insight.prediction_id, Some(PredictionId::new(7)));
        assert!(insight.is_committed());
    }
}
