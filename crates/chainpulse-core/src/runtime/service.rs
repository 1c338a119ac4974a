// crates/chainpulse-core/src/runtime/service.rs
// ============================================================================
// Module: ChainPulse Provenance Service
// Description: Transport-agnostic request handlers over the provenance pipeline.
// Purpose: Apply input bounds and public error shaping for every entry point.
// Dependencies: serde, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`ProvenanceService`] is what a transport (CLI, HTTP, scheduler) calls. It
//! clamps paging inputs, rejects out-of-bound verify inputs, and never exposes
//! pipeline internals: a failed analysis reports only `"analysis failed"`
//! while the detailed [`PipelineError`] stays available for audit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::AIInsight;
use crate::core::Category;
use crate::core::ContentHash;
use crate::core::InsightDraft;
use crate::core::InsightId;
use crate::core::MarketSnapshotRef;
use crate::core::PredictionId;
use crate::core::Timestamp;
use crate::core::TxHash;
use crate::core::parse_analysis_response;
use crate::interfaces::InsightQuery;
use crate::interfaces::InsightStore;
use crate::interfaces::LedgerClient;
use crate::interfaces::StoreError;
use crate::runtime::orchestrator::AnalysisOrchestrator;
use crate::runtime::orchestrator::AnalysisRequest;
use crate::runtime::orchestrator::PipelineError;
use crate::runtime::reconcile::ReconcileError;
use crate::runtime::reconcile::ReconcileReport;
use crate::runtime::reconcile::Reconciler;
use crate::runtime::retry::LedgerCallError;
use crate::runtime::retry::bounded_read;
use crate::runtime::verifier::InsightVerifier;
use crate::runtime::verifier::VerificationOutcome;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default number of predictions listed.
pub const DEFAULT_PREDICTION_LIMIT: u64 = 20;
/// Maximum number of predictions listed.
pub const MAX_PREDICTION_LIMIT: u64 = 100;
/// Default insights per page.
pub const DEFAULT_INSIGHT_PAGE_SIZE: usize = 10;
/// Maximum insights per page.
pub const MAX_INSIGHT_PAGE_SIZE: usize = 100;
/// Largest prediction id accepted by verify.
pub const MAX_VERIFY_PREDICTION_ID: u64 = 1_000_000;
/// Largest verify content length in characters.
pub const MAX_VERIFY_CONTENT_CHARS: usize = 10_000;

/// Public message for any failed analysis run.
pub const ANALYSIS_FAILED_MESSAGE: &str = "analysis failed";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Service-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Request input is out of bounds.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The analysis run failed; the detail is for audit only.
    #[error("{ANALYSIS_FAILED_MESSAGE}")]
    AnalysisFailed(Box<PipelineError>),
    /// A ledger read failed.
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerCallError),
    /// The insight store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Returns a stable label for audit and exit reporting.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::AnalysisFailed(_) => "analysis_failed",
            Self::Ledger(_) => "ledger_unavailable",
            Self::Store(_) => "store_error",
            Self::Reconcile(_) => "reconcile_failed",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Returns the internal pipeline error behind an analysis failure.
    #[must_use]
    pub fn pipeline_detail(&self) -> Option<&PipelineError> {
        match self {
            Self::AnalysisFailed(detail) => Some(detail),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Result of a successful analysis trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAnalysisResponse {
    /// Always true for this type; failures are errors.
    pub success: bool,
    /// Number of committed insights.
    pub insight_count: usize,
    /// Batch transaction reference.
    pub tx_hash: TxHash,
    /// Committed insights.
    pub insights: Vec<AIInsight>,
}

/// Ledger record as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    /// Ledger index.
    pub id: PredictionId,
    /// Content hash.
    pub content_hash: ContentHash,
    /// Commit time (unix seconds).
    pub timestamp: Timestamp,
    /// Category code.
    pub category: u8,
    /// Category name.
    pub category_name: &'static str,
    /// Sentiment score.
    pub sentiment_score: i8,
    /// Summary.
    pub summary: String,
}

/// Latest ledger records plus the total count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionListResponse {
    /// Records, newest first.
    pub predictions: Vec<PredictionView>,
    /// Ledger count.
    pub total: u64,
}

/// Insight page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightListResponse {
    /// Insights, newest first.
    pub insights: Vec<AIInsight>,
    /// Matching insights.
    pub total: usize,
    /// Effective page (1-based).
    pub page: usize,
    /// Effective page size.
    pub limit: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// Verification answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Insight checked, when verifying a stored record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_id: Option<InsightId>,
    /// Ledger index checked.
    pub prediction_id: Option<PredictionId>,
    /// Tri-state outcome.
    pub outcome: VerificationOutcome,
    /// True only when the outcome is verified.
    pub verified: bool,
}

impl VerifyResponse {
    /// Builds a response from an outcome.
    fn new(insight_id: Option<InsightId>, prediction_id: Option<PredictionId>, outcome: VerificationOutcome) -> Self {
        Self {
            insight_id,
            prediction_id,
            outcome,
            verified: outcome.is_verified(),
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Provenance service over a ledger client and insight store.
pub struct ProvenanceService<L, S> {
    /// Analysis orchestrator (owns the run guard).
    orchestrator: AnalysisOrchestrator<L, S>,
    /// Verifier.
    verifier: InsightVerifier<L>,
    /// Reconciler.
    reconciler: Reconciler<L, S>,
}

impl<L, S> ProvenanceService<L, S>
where
    L: LedgerClient + Clone,
    S: InsightStore + 'static,
{
    /// Creates a service sharing the orchestrator's ledger client and store.
    #[must_use]
    pub fn new(orchestrator: AnalysisOrchestrator<L, S>, verifier: InsightVerifier<L>) -> Self {
        let reconciler = Reconciler::new(
            orchestrator.ledger().clone(),
            Arc::clone(orchestrator.store()),
            orchestrator.config().call_policy,
        );
        Self {
            orchestrator,
            verifier,
            reconciler,
        }
    }

    /// Returns the orchestrator.
    pub const fn orchestrator(&self) -> &AnalysisOrchestrator<L, S> {
        &self.orchestrator
    }

    /// Runs one analysis and returns the committed insights.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AnalysisFailed`] for any pipeline failure.
    pub async fn trigger_analysis(
        &self,
        drafts: Vec<InsightDraft>,
        snapshot: Option<MarketSnapshotRef>,
    ) -> Result<TriggerAnalysisResponse, ServiceError> {
        let result = self
            .orchestrator
            .run(AnalysisRequest {
                drafts,
                snapshot,
            })
            .await
            .map_err(|err| ServiceError::AnalysisFailed(Box::new(err)))?;
        Ok(TriggerAnalysisResponse {
            success: true,
            insight_count: result.insights.len(),
            tx_hash: result.receipt.tx_hash,
            insights: result.insights,
        })
    }

    /// Parses a raw generator response (`{"insights": [...]}`) and runs it
    /// through [`Self::trigger_analysis`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AnalysisFailed`] wrapping
    /// [`PipelineError::SchemaInvalid`] when the response is malformed, holds
    /// other than 1..=5 drafts, or breaks a draft bound; nothing is committed
    /// in that case. Pipeline failures surface as in [`Self::trigger_analysis`].
    pub async fn trigger_analysis_response(
        &self,
        response: &str,
        snapshot: Option<MarketSnapshotRef>,
    ) -> Result<TriggerAnalysisResponse, ServiceError> {
        let drafts = parse_analysis_response(response)
            .map_err(|err| ServiceError::AnalysisFailed(Box::new(PipelineError::SchemaInvalid(err))))?;
        self.trigger_analysis(drafts, snapshot).await
    }

    /// Lists the newest ledger records (default 20, at most 100).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Ledger`] when the ledger cannot be read.
    pub async fn list_predictions(&self, limit: Option<u64>) -> Result<PredictionListResponse, ServiceError> {
        let limit = match limit {
            Some(0) | None => DEFAULT_PREDICTION_LIMIT,
            Some(value) => value.min(MAX_PREDICTION_LIMIT),
        };
        let policy = self.orchestrator.config().call_policy;
        let ledger = self.orchestrator.ledger();
        let total = bounded_read(&policy, || ledger.prediction_count()).await?;
        let take = limit.min(total);
        if take == 0 {
            return Ok(PredictionListResponse {
                predictions: Vec::new(),
                total,
            });
        }
        let records = bounded_read(&policy, || ledger.get_latest_predictions(take)).await?;
        let predictions = records
            .into_iter()
            .enumerate()
            .map(|(offset, record)| PredictionView {
                id: PredictionId::new(total.saturating_sub(1 + offset as u64)),
                content_hash: record.content_hash,
                timestamp: record.timestamp,
                category: record.category.code(),
                category_name: record.category.name(),
                sentiment_score: record.sentiment_score,
                summary: record.summary,
            })
            .collect();
        Ok(PredictionListResponse {
            predictions,
            total,
        })
    }

    /// Returns a page of stored insights.
    ///
    /// Non-positive page or limit fall back to defaults; limit is capped at 100.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for an unknown category name, or
    /// [`ServiceError::Store`] when the store fails.
    pub async fn list_insights(
        &self,
        page: Option<usize>,
        limit: Option<usize>,
        category: Option<&str>,
    ) -> Result<InsightListResponse, ServiceError> {
        let page = page.filter(|page| *page > 0).unwrap_or(1);
        let limit = limit
            .filter(|limit| *limit > 0)
            .map_or(DEFAULT_INSIGHT_PAGE_SIZE, |limit| limit.min(MAX_INSIGHT_PAGE_SIZE));
        let category = category
            .map(|name| {
                Category::parse(name).map_err(|_| {
                    let names: Vec<&str> = Category::ALL.iter().map(|c| c.name()).collect();
                    ServiceError::InvalidRequest(format!(
                        "invalid category, must be one of: {}",
                        names.join(", ")
                    ))
                })
            })
            .transpose()?;
        let query = InsightQuery {
            category,
            offset: (page - 1).saturating_mul(limit),
            limit,
        };
        let store = Arc::clone(self.orchestrator.store());
        let result = tokio::task::spawn_blocking(move || store.list(&query))
            .await
            .map_err(|err| StoreError::Store(format!("store task join failed: {err}")))??;
        Ok(InsightListResponse {
            total_pages: result.total.div_ceil(limit),
            total: result.total,
            insights: result.items,
            page,
            limit,
        })
    }

    /// Verifies caller-supplied content against a ledger record.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] when the id exceeds 1,000,000 or
    /// the content is empty or longer than 10,000 characters.
    pub async fn verify(&self, prediction_id: u64, content: &str) -> Result<VerifyResponse, ServiceError> {
        let chars = content.chars().count();
        if prediction_id > MAX_VERIFY_PREDICTION_ID || chars == 0 || chars > MAX_VERIFY_CONTENT_CHARS {
            return Err(ServiceError::InvalidRequest(format!(
                "predictionId must be 0-{MAX_VERIFY_PREDICTION_ID}, content must be 1-{MAX_VERIFY_CONTENT_CHARS} chars"
            )));
        }
        let id = PredictionId::new(prediction_id);
        let outcome = self.verifier.verify_content(id, content).await;
        Ok(VerifyResponse::new(None, Some(id), outcome))
    }

    /// Verifies a stored insight by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown ids or
    /// [`ServiceError::Store`] when the store fails.
    pub async fn verify_insight(&self, insight_id: &InsightId) -> Result<VerifyResponse, ServiceError> {
        let store = Arc::clone(self.orchestrator.store());
        let lookup = insight_id.clone();
        let insight = tokio::task::spawn_blocking(move || store.get(&lookup))
            .await
            .map_err(|err| StoreError::Store(format!("store task join failed: {err}")))??
            .ok_or_else(|| ServiceError::NotFound(format!("insight {insight_id}")))?;
        let outcome = self.verifier.verify_insight(&insight).await;
        Ok(VerifyResponse::new(Some(insight.id), insight.prediction_id, outcome))
    }

    /// Reports committed predictions with no local insight.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Reconcile`] when the scan fails.
    pub async fn reconcile(&self, window: u64) -> Result<ReconcileReport, ServiceError> {
        Ok(self.reconciler.scan(window).await?)
    }
}

// ============================================================================
// SECTION: Explorer Links
// ============================================================================

/// BNB Smart Chain mainnet id.
pub const BSC_MAINNET_CHAIN_ID: u64 = 56;

/// Returns the block explorer base URL for `chain_id`.
#[must_use]
pub const fn explorer_base_url(chain_id: u64) -> &'static str {
    if chain_id == BSC_MAINNET_CHAIN_ID { "https://bscscan.com" } else { "https://testnet.bscscan.com" }
}

/// Returns the explorer URL of a transaction.
#[must_use]
pub fn explorer_tx_url(chain_id: u64, tx_hash: &TxHash) -> String {
    format!("{}/tx/{}", explorer_base_url(chain_id), tx_hash.to_hex())
}
