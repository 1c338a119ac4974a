// crates/chainpulse-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: ChainPulse Analysis Orchestrator
// Description: Drives one analysis run from drafts to a committed, persisted batch.
// Purpose: Guarantee ledger commit precedes local persistence and ids are derived safely.
// Dependencies: tokio, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! A run moves through fixed steps:
//! 1. Map every draft category; any unknown name aborts before the ledger is touched.
//! 2. Validate bounds, canonicalize, and hash every draft.
//! 3. Submit one batch commit and wait for its receipt (never retried).
//! 4. Read the post-commit count, derive `count - n + i` ids, and read each id
//!    back to confirm its content hash.
//! 5. Prepend the enriched insights to the store.
//!
//! Steps 3 to 5 run under a single-flight guard so two runs cannot derive
//! overlapping id ranges. Insight ids take a millisecond stamp that strictly
//! increases across runs of one orchestrator; when the store still reports a
//! duplicate id (another process stamped the same millisecond) the batch is
//! re-stamped and persisted again. A failure after step 3 returns the committed batch
//! to the caller instead of dropping it; nothing is persisted for a batch whose
//! commit did not finalize.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::AIInsight;
use crate::core::CanonicalVersion;
use crate::core::CommitReceipt;
use crate::core::ContentHash;
use crate::core::HashError;
use crate::core::InsightDraft;
use crate::core::InsightId;
use crate::core::MarketSnapshotRef;
use crate::core::PredictionBatch;
use crate::core::PredictionId;
use crate::core::PredictionInput;
use crate::core::SchemaError;
use crate::core::TxHash;
use crate::core::content_hash;
use crate::core::time::rfc3339_from_unix_millis;
use crate::interfaces::Clock;
use crate::interfaces::InsightStore;
use crate::interfaces::LedgerClient;
use crate::interfaces::LedgerClientError;
use crate::interfaces::StoreError;
use crate::runtime::audit::AnalysisAuditEvent;
use crate::runtime::audit::AnalysisAuditEventParams;
use crate::runtime::audit::AnalysisOutcome;
use crate::runtime::audit::PipelineAuditSink;
use crate::runtime::retry::LedgerCallError;
use crate::runtime::retry::LedgerCallPolicy;
use crate::runtime::retry::bounded_read;
use crate::runtime::retry::bounded_write;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default drafts per run.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;
/// Upper bound on the configurable batch size.
pub const HARD_MAX_BATCH_SIZE: usize = 64;
/// Re-stamps attempted when the store reports a duplicate insight id.
const MAX_ID_RESTAMPS: usize = 3;

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum drafts per run (1..=64).
    pub max_batch_size: usize,
    /// Canonical encoding for new insights.
    pub canonical_version: CanonicalVersion,
    /// Ledger deadlines and read retries.
    pub call_policy: LedgerCallPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            canonical_version: CanonicalVersion::V1,
            call_policy: LedgerCallPolicy::default(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Input to a single analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Drafts in generator order.
    pub drafts: Vec<InsightDraft>,
    /// Audit-only reference to the originating market data.
    pub snapshot: Option<MarketSnapshotRef>,
}

/// Committed and persisted run output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Persisted insights in draft order.
    pub insights: Vec<AIInsight>,
    /// Commit receipt shared by every insight.
    pub receipt: CommitReceipt,
}

/// A batch that finalized on the ledger but is not in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpersistedBatch {
    /// Commit receipt.
    pub receipt: CommitReceipt,
    /// Insights in draft order; ids are present only when `ids_assigned`.
    pub insights: Vec<AIInsight>,
    /// Whether prediction ids were derived and confirmed.
    pub ids_assigned: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Analysis run failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Orchestrator settings are out of bounds.
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
    /// A draft or the batch failed validation; nothing was written.
    #[error("schema invalid: {0}")]
    SchemaInvalid(#[from] SchemaError),
    /// Canonical encoding failed; nothing was written.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] HashError),
    /// The ledger rejected the batch; nothing was written.
    #[error("ledger write rejected: {0}")]
    LedgerWriteRejected(String),
    /// The ledger could not be reached; nothing was written.
    #[error("ledger unreachable: {0}")]
    LedgerUnreachable(String),
    /// The ledger did not answer in time; nothing was written.
    #[error("ledger timed out after {} ms", .0.as_millis())]
    LedgerTimeout(Duration),
    /// The batch committed but local persistence did not complete.
    #[error("batch {tx} committed but not persisted: {reason}", tx = .batch.receipt.tx_hash)]
    CommittedNotPersisted {
        /// Committed batch awaiting persistence.
        batch: Box<UnpersistedBatch>,
        /// Failure description.
        reason: String,
    },
    /// A derived prediction id does not hold the expected content hash.
    #[error("prediction id assignment conflict at {id}: {reason}")]
    IdAssignmentConflict {
        /// Committed batch (ids not assigned).
        batch: Box<UnpersistedBatch>,
        /// First conflicting id.
        id: PredictionId,
        /// Conflict description.
        reason: String,
    },
}

impl PipelineError {
    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_invalid",
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::Canonicalization(_) => "canonicalization_failed",
            Self::LedgerWriteRejected(_) => "ledger_write_rejected",
            Self::LedgerUnreachable(_) => "ledger_unreachable",
            Self::LedgerTimeout(_) => "ledger_timeout",
            Self::CommittedNotPersisted { .. } => "committed_not_persisted",
            Self::IdAssignmentConflict { .. } => "id_assignment_conflict",
        }
    }

    /// Returns the committed batch when the failure happened after the commit.
    #[must_use]
    pub fn unpersisted_batch(&self) -> Option<&UnpersistedBatch> {
        match self {
            Self::CommittedNotPersisted { batch, .. } | Self::IdAssignmentConflict { batch, .. } => {
                Some(batch)
            }
            _ => None,
        }
    }
}

/// Maps a failed batch write onto the pre-commit taxonomy.
fn write_error(err: LedgerCallError) -> PipelineError {
    match err {
        LedgerCallError::Timeout(after) => PipelineError::LedgerTimeout(after),
        LedgerCallError::Client(LedgerClientError::Unreachable(msg)) => {
            PipelineError::LedgerUnreachable(msg)
        }
        LedgerCallError::Client(LedgerClientError::Rejected(reason)) => {
            PipelineError::LedgerWriteRejected(reason)
        }
        LedgerCallError::Client(LedgerClientError::NotFound(id)) => {
            PipelineError::LedgerWriteRejected(format!("prediction {id} does not exist"))
        }
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Prepared, not yet committed run.
struct PreparedRun {
    /// Insights without ledger references.
    insights: Vec<AIInsight>,
    /// Parallel arrays for the ledger.
    batch: PredictionBatch,
}

/// Analysis orchestrator.
pub struct AnalysisOrchestrator<L, S> {
    /// Ledger client.
    ledger: L,
    /// Insight store.
    store: Arc<S>,
    /// Host clock.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn PipelineAuditSink>,
    /// Settings.
    config: OrchestratorConfig,
    /// Single-flight guard over commit, id assignment, and persistence.
    run_guard: Mutex<()>,
    /// Last millisecond stamp used for insight ids.
    last_id_millis: AtomicU64,
}

impl<L, S> AnalysisOrchestrator<L, S>
where
    L: LedgerClient,
    S: InsightStore + 'static,
{
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when `max_batch_size` is outside 1..=64.
    pub fn new(
        config: OrchestratorConfig,
        ledger: L,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn PipelineAuditSink>,
    ) -> Result<Self, PipelineError> {
        if !(1 ..= HARD_MAX_BATCH_SIZE).contains(&config.max_batch_size) {
            return Err(PipelineError::Config(format!(
                "max_batch_size must be between 1 and {HARD_MAX_BATCH_SIZE}"
            )));
        }
        Ok(Self {
            ledger,
            store,
            clock,
            audit,
            config,
            run_guard: Mutex::new(()),
            last_id_millis: AtomicU64::new(0),
        })
    }

    /// Returns the ledger client.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the insight store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the orchestrator settings.
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Executes one analysis run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`]; variants other than
    /// [`PipelineError::CommittedNotPersisted`] and
    /// [`PipelineError::IdAssignmentConflict`] guarantee nothing was committed.
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResult, PipelineError> {
        let batch_size = request.drafts.len();
        let prepared = match self.prepare(&request.drafts) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.audit_run(&request, AnalysisOutcome::Rejected, Vec::new(), None, None, Some(&err));
                return Err(err);
            }
        };
        let hashes = prepared.batch.hashes.clone();

        let _guard = self.run_guard.lock().await;
        let receipt = match bounded_write(
            &self.config.call_policy,
            self.ledger.store_prediction_batch(&prepared.batch),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                let err = write_error(err);
                self.audit_run(&request, AnalysisOutcome::Failed, hashes, None, None, Some(&err));
                return Err(err);
            }
        };

        let result = self.finish_commit(prepared, receipt.clone(), batch_size).await;
        match &result {
            Ok(done) => {
                let first = done.insights.first().and_then(|insight| insight.prediction_id);
                self.audit_run(
                    &request,
                    AnalysisOutcome::Committed,
                    hashes,
                    Some(receipt.tx_hash),
                    first,
                    None,
                );
            }
            Err(err) => {
                self.audit_run(
                    &request,
                    AnalysisOutcome::CommittedNotPersisted,
                    hashes,
                    Some(receipt.tx_hash),
                    None,
                    Some(err),
                );
            }
        }
        result
    }

    /// Persists a batch returned by [`PipelineError::CommittedNotPersisted`]
    /// once its ids are assigned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CommittedNotPersisted`] when the store still fails
    /// or the batch has no assigned ids.
    pub async fn retry_persist(&self, batch: UnpersistedBatch) -> Result<AnalysisResult, PipelineError> {
        if !batch.ids_assigned {
            return Err(PipelineError::CommittedNotPersisted {
                reason: "prediction ids were never assigned; reconcile first".to_string(),
                batch: Box::new(batch),
            });
        }
        let _guard = self.run_guard.lock().await;
        self.persist(batch).await
    }

    /// Validates, canonicalizes, and hashes every draft.
    fn prepare(&self, drafts: &[InsightDraft]) -> Result<PreparedRun, PipelineError> {
        if drafts.is_empty() || drafts.len() > self.config.max_batch_size {
            return Err(SchemaError::BatchSize {
                min: 1,
                max: self.config.max_batch_size,
                actual: drafts.len(),
            }
            .into());
        }
        // Categories first: an unknown name must stop the run before anything else.
        let categories =
            drafts.iter().map(InsightDraft::category_code).collect::<Result<Vec<_>, _>>()?;
        for draft in drafts {
            draft.validate()?;
        }

        let now_ms = self.clock.now_millis();
        let created_at = rfc3339_from_unix_millis(now_ms)
            .ok_or_else(|| PipelineError::Config("clock outside representable range".to_string()))?;
        let id_millis = self.next_id_millis(now_ms);
        let version = self.config.canonical_version;
        let mut insights = Vec::with_capacity(drafts.len());
        let mut inputs = Vec::with_capacity(drafts.len());
        for (index, (draft, category)) in drafts.iter().zip(categories).enumerate() {
            let hash = content_hash(draft, version)?;
            inputs.push(PredictionInput {
                content_hash: hash,
                category: category.code(),
                sentiment_score: draft.ledger_sentiment()?,
                summary: draft.summary.clone(),
            });
            insights.push(AIInsight {
                id: InsightId::for_run(id_millis, index),
                draft: draft.clone(),
                content_hash: hash,
                created_at: created_at.clone(),
                canonical_version: version,
                tx_hash: None,
                prediction_id: None,
            });
        }
        Ok(PreparedRun {
            insights,
            batch: PredictionBatch::from_inputs(inputs),
        })
    }

    /// Derives and confirms ids, then persists. Runs under the run guard.
    async fn finish_commit(
        &self,
        prepared: PreparedRun,
        receipt: CommitReceipt,
        batch_size: usize,
    ) -> Result<AnalysisResult, PipelineError> {
        let mut batch = UnpersistedBatch {
            receipt,
            insights: prepared.insights,
            ids_assigned: false,
        };
        for insight in &mut batch.insights {
            insight.tx_hash = Some(batch.receipt.tx_hash);
        }

        let policy = self.config.call_policy;
        let count_after = match bounded_read(&policy, || self.ledger.prediction_count()).await {
            Ok(count) => count,
            Err(err) => {
                return Err(PipelineError::CommittedNotPersisted {
                    batch: Box::new(batch),
                    reason: format!("post-commit count read failed: {err}"),
                });
            }
        };
        let n = batch_size as u64;
        let Some(first) = count_after.checked_sub(n) else {
            return Err(PipelineError::IdAssignmentConflict {
                batch: Box::new(batch),
                id: PredictionId::new(count_after),
                reason: format!("ledger count {count_after} is smaller than batch size {n}"),
            });
        };

        for (index, hash) in prepared.batch.hashes.iter().enumerate() {
            let id = PredictionId::new(first + index as u64);
            match self.confirm_id(&policy, id, hash).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(PipelineError::IdAssignmentConflict {
                        batch: Box::new(batch),
                        id,
                        reason: "stored content hash differs from committed hash".to_string(),
                    });
                }
                Err(err) => {
                    return Err(PipelineError::CommittedNotPersisted {
                        batch: Box::new(batch),
                        reason: format!("post-commit confirmation of {id} failed: {err}"),
                    });
                }
            }
        }
        for (index, insight) in batch.insights.iter_mut().enumerate() {
            insight.prediction_id = Some(PredictionId::new(first + index as u64));
        }
        batch.ids_assigned = true;
        self.persist(batch).await
    }

    /// Reads back `id` and compares its content hash.
    async fn confirm_id(
        &self,
        policy: &LedgerCallPolicy,
        id: PredictionId,
        expected: &ContentHash,
    ) -> Result<bool, LedgerCallError> {
        let record = bounded_read(policy, || self.ledger.get_prediction(id)).await?;
        Ok(record.content_hash == *expected)
    }

    /// Returns an id stamp no earlier than `now_ms` and strictly after every
    /// stamp this orchestrator issued before.
    fn next_id_millis(&self, now_ms: u64) -> u64 {
        let mut last = self.last_id_millis.load(Ordering::Acquire);
        loop {
            let next = now_ms.max(last.saturating_add(1));
            match self.last_id_millis.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Prepends a confirmed batch to the store on the blocking pool.
    async fn persist(&self, mut batch: UnpersistedBatch) -> Result<AnalysisResult, PipelineError> {
        let mut restamps = 0;
        loop {
            let store = Arc::clone(&self.store);
            let insights = batch.insights.clone();
            let outcome = tokio::task::spawn_blocking(move || store.prepend(&insights))
                .await
                .map_err(|err| StoreError::Store(format!("store task join failed: {err}")))
                .and_then(|result| result);
            match outcome {
                Ok(()) => {
                    return Ok(AnalysisResult {
                        insights: batch.insights,
                        receipt: batch.receipt,
                    });
                }
                Err(StoreError::DuplicateId(_)) if restamps < MAX_ID_RESTAMPS => {
                    restamps += 1;
                    let id_millis = self.next_id_millis(self.clock.now_millis());
                    for (index, insight) in batch.insights.iter_mut().enumerate() {
                        insight.id = InsightId::for_run(id_millis, index);
                    }
                }
                Err(err) => {
                    return Err(PipelineError::CommittedNotPersisted {
                        batch: Box::new(batch),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Emits an analysis audit event.
    fn audit_run(
        &self,
        request: &AnalysisRequest,
        outcome: AnalysisOutcome,
        content_hashes: Vec<ContentHash>,
        tx_hash: Option<TxHash>,
        first_prediction_id: Option<PredictionId>,
        error: Option<&PipelineError>,
    ) {
        self.audit.record_analysis(&AnalysisAuditEvent::new(AnalysisAuditEventParams {
            outcome,
            snapshot: request.snapshot.clone(),
            batch_size: request.drafts.len(),
            content_hashes,
            tx_hash,
            first_prediction_id,
            error_kind: error.map(PipelineError::kind),
        }));
    }
}
