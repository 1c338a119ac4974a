// crates/chainpulse-core/src/core/mod.rs
// ============================================================================
// Module: ChainPulse Core Types
// Description: Insight, prediction, identity, and hashing data model.
// Purpose: Provide stable, serializable types shared by every ChainPulse crate.
// Dependencies: serde, serde_json, serde_jcs, sha2, time, tiny-keccak
// ============================================================================

//! ## Overview
//! Core types are the canonical source of truth for the provenance pipeline:
//! drafts and insights, ledger records, canonical encodings, and digests.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod canonical;
pub mod category;
pub mod hashing;
pub mod identifiers;
pub mod insight;
pub mod prediction;
pub mod snapshot;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use canonical::CanonicalVersion;
pub use canonical::canonical_bytes;
pub use canonical::canonical_string;
pub use canonical::content_hash;
pub use category::Category;
pub use category::CategoryError;
pub use hashing::ContentHash;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::TxHash;
pub use identifiers::Address;
pub use identifiers::InsightId;
pub use identifiers::PredictionId;
pub use insight::AIInsight;
pub use insight::AnalysisResponse;
pub use insight::InsightDraft;
pub use insight::SchemaError;
pub use insight::parse_analysis_response;
pub use prediction::CommitReceipt;
pub use prediction::Prediction;
pub use prediction::PredictionBatch;
pub use prediction::PredictionInput;
pub use snapshot::MarketSnapshotRef;
pub use time::Timestamp;
