// crates/chainpulse-core/src/runtime/mod.rs
// ============================================================================
// Module: ChainPulse Runtime
// Description: Ledger engine, orchestration, verification, and local stores.
// Purpose: Execute the commit-then-persist pipeline against explicit interfaces.
// Dependencies: tokio, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the prediction ledger engine, the analysis
//! orchestrator, verification, and reconciliation. Every transport goes
//! through [`ProvenanceService`] so input bounds and error shaping stay in one
//! place.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod clock;
pub mod ledger;
pub mod local_ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod service;
pub mod store;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AnalysisAuditEvent;
pub use audit::AnalysisOutcome;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::PipelineAuditSink;
pub use audit::StderrAuditSink;
pub use audit::VerificationAuditEvent;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use ledger::LedgerError;
pub use ledger::LedgerEvent;
pub use ledger::PredictionLedger;
pub use local_ledger::LedgerCommitError;
pub use local_ledger::LedgerStateSink;
pub use local_ledger::LedgerWrite;
pub use local_ledger::LocalLedgerClient;
pub use orchestrator::AnalysisOrchestrator;
pub use orchestrator::AnalysisRequest;
pub use orchestrator::AnalysisResult;
pub use orchestrator::OrchestratorConfig;
pub use orchestrator::PipelineError;
pub use orchestrator::UnpersistedBatch;
pub use reconcile::OrphanPrediction;
pub use reconcile::ReconcileError;
pub use reconcile::ReconcileReport;
pub use reconcile::Reconciler;
pub use retry::LedgerCallError;
pub use retry::LedgerCallPolicy;
pub use service::InsightListResponse;
pub use service::PredictionListResponse;
pub use service::PredictionView;
pub use service::ProvenanceService;
pub use service::ServiceError;
pub use service::TriggerAnalysisResponse;
pub use service::VerifyResponse;
pub use service::explorer_tx_url;
pub use store::InMemoryInsightStore;
pub use verifier::InsightVerifier;
pub use verifier::UnavailableReason;
pub use verifier::VerificationOutcome;
