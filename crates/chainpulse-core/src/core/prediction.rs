// crates/chainpulse-core/src/core/prediction.rs
// ============================================================================
// Module: ChainPulse Prediction Records
// Description: Ledger prediction records and commit receipts.
// Purpose: Provide the serializable shapes exchanged with the ledger boundary.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Prediction`] is immutable once appended. A [`CommitReceipt`] is the only
//! trusted evidence that a batch commit finalized; prediction ids are derived
//! from a post-commit count read, never assumed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::category::Category;
use crate::core::hashing::ContentHash;
use crate::core::hashing::TxHash;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Ledger Record
// ============================================================================

/// Ledger prediction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Keccak-256 content hash.
    pub content_hash: ContentHash,
    /// Commit time assigned by the ledger.
    pub timestamp: Timestamp,
    /// Category (code 0..=3 on the ledger).
    pub category: Category,
    /// Sentiment score in -100..=100.
    pub sentiment_score: i8,
    /// Summary (at most 200 bytes).
    pub summary: String,
}

/// One element of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionInput {
    /// Content hash to commit.
    pub content_hash: ContentHash,
    /// Raw category code; the ledger rejects codes above 3.
    pub category: u8,
    /// Sentiment score.
    pub sentiment_score: i8,
    /// Summary text.
    pub summary: String,
}

/// Parallel-array batch submission, mirroring the ledger call surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionBatch {
    /// Content hashes.
    pub hashes: Vec<ContentHash>,
    /// Category codes.
    pub categories: Vec<u8>,
    /// Sentiment scores.
    pub sentiments: Vec<i8>,
    /// Summaries.
    pub summaries: Vec<String>,
}

impl PredictionBatch {
    /// Builds aligned arrays from batch elements.
    #[must_use]
    pub fn from_inputs(inputs: Vec<PredictionInput>) -> Self {
        let mut batch = Self::default();
        for input in inputs {
            batch.hashes.push(input.content_hash);
            batch.categories.push(input.category);
            batch.sentiments.push(input.sentiment_score);
            batch.summaries.push(input.summary);
        }
        batch
    }

    /// Returns the number of hashes in the batch.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Returns true when the batch has no hashes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Returns true when all four arrays share one length.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        let len = self.hashes.len();
        self.categories.len() == len && self.sentiments.len() == len && self.summaries.len() == len
    }
}

// ============================================================================
// SECTION: Commit Receipt
// ============================================================================

/// Evidence that a batch commit finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    /// Transaction reference.
    pub tx_hash: TxHash,
    /// Number of predictions appended.
    pub batch_size: u64,
    /// Ledger commit time.
    pub committed_at: Timestamp,
}
