// crates/chainpulse-core/src/lib.rs
// ============================================================================
// Module: ChainPulse Core Library
// Description: Public API surface for the ChainPulse provenance pipeline.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! ChainPulse commits a hash of every AI market insight to an append-only
//! prediction ledger before the insight is stored locally, so any stored
//! insight can later be re-hashed and checked against the ledger. The crate
//! is transport-agnostic: ledger access and storage sit behind
//! [`LedgerClient`] and [`InsightStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::Clock;
pub use interfaces::InsightPage;
pub use interfaces::InsightQuery;
pub use interfaces::InsightStore;
pub use interfaces::LedgerClient;
pub use interfaces::LedgerClientError;
pub use interfaces::StoreError;
pub use runtime::AnalysisOrchestrator;
pub use runtime::AnalysisRequest;
pub use runtime::AnalysisResult;
pub use runtime::InMemoryInsightStore;
pub use runtime::InsightVerifier;
pub use runtime::LedgerCallError;
pub use runtime::LedgerCallPolicy;
pub use runtime::LocalLedgerClient;
pub use runtime::OrchestratorConfig;
pub use runtime::PipelineError;
pub use runtime::PredictionLedger;
pub use runtime::ProvenanceService;
pub use runtime::ServiceError;
pub use runtime::UnavailableReason;
pub use runtime::UnpersistedBatch;
pub use runtime::VerificationOutcome;
