// crates/chainpulse-core/tests/common/mod.rs
// =============================================================================
// Module: Pipeline Test Helpers
// Description: Scripted ledger client, flaky store, and recording audit sink.
// Purpose: Inject ledger and store failures into orchestrator and service tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chainpulse_core::AIInsight;
use chainpulse_core::Address;
use chainpulse_core::CommitReceipt;
use chainpulse_core::ContentHash;
use chainpulse_core::InMemoryInsightStore;
use chainpulse_core::InsightDraft;
use chainpulse_core::InsightId;
use chainpulse_core::InsightPage;
use chainpulse_core::InsightQuery;
use chainpulse_core::InsightStore;
use chainpulse_core::LedgerClient;
use chainpulse_core::LedgerClientError;
use chainpulse_core::LocalLedgerClient;
use chainpulse_core::Prediction;
use chainpulse_core::PredictionBatch;
use chainpulse_core::PredictionId;
use chainpulse_core::PredictionInput;
use chainpulse_core::PredictionLedger;
use chainpulse_core::StoreError;
use chainpulse_core::Timestamp;
use chainpulse_core::runtime::AnalysisAuditEvent;
use chainpulse_core::runtime::FixedClock;
use chainpulse_core::runtime::PipelineAuditSink;
use chainpulse_core::runtime::VerificationAuditEvent;

pub const OWNER: Address = Address::from_bytes([1; 20]);
pub const AGENT: Address = Address::from_bytes([2; 20]);
pub const NOW_MS: u64 = 1_700_000_000_123;

/// Returns a valid draft whose text is derived from `label`.
pub fn draft(category: &str, label: &str) -> InsightDraft {
    InsightDraft {
        category: category.to_string(),
        title: format!("title {label}"),
        summary: format!("summary {label}"),
        full_analysis: format!("analysis {label}"),
        sentiment_score: -40,
        confidence: 70,
        data_points: vec![format!("point {label}")],
    }
}

/// Returns a fixed clock at [`NOW_MS`].
pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(NOW_MS))
}

/// Deploys a ledger holding `seeded` unrelated predictions.
pub fn seeded_ledger(seeded: u8) -> PredictionLedger {
    let mut ledger = PredictionLedger::deploy(OWNER, AGENT).unwrap();
    for seed in 0 .. seeded {
        let input = PredictionInput {
            content_hash: ContentHash::of(&[0xee, seed]),
            category: 0,
            sentiment_score: 0,
            summary: format!("seed {seed}"),
        };
        ledger.store_prediction(&AGENT, Timestamp::from_unix_secs(1), &input).unwrap();
    }
    ledger
}

// ============================================================================
// SECTION: Scripted Ledger
// ============================================================================

/// Ledger client wrapper with failure injection and call counting.
pub struct ScriptedLedger {
    /// Real in-process client.
    pub inner: LocalLedgerClient,
    /// Number of write calls observed.
    pub writes: AtomicUsize,
    /// Number of read calls observed.
    pub reads: AtomicUsize,
    /// Delay applied before a write reaches the ledger.
    pub write_delay: Mutex<Option<Duration>>,
    /// When set, every read fails as unreachable.
    pub reads_down: AtomicBool,
    /// When set, one foreign prediction lands right after the next batch.
    pub interleave: AtomicBool,
}

impl ScriptedLedger {
    /// Wraps a ledger, signing as the agent.
    pub fn new(ledger: PredictionLedger) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalLedgerClient::new(ledger, AGENT, clock()),
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            write_delay: Mutex::new(None),
            reads_down: AtomicBool::new(false),
            interleave: AtomicBool::new(false),
        })
    }

    /// Returns the total number of ledger calls.
    pub fn calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst) + self.reads.load(Ordering::SeqCst)
    }

    /// Returns the committed count without going through the scripted path.
    pub fn count(&self) -> u64 {
        self.inner.snapshot().unwrap().prediction_count()
    }

    async fn before_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn before_read(&self) -> Result<(), LedgerClientError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(LedgerClientError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn store_prediction(
        &self,
        input: PredictionInput,
    ) -> Result<(PredictionId, CommitReceipt), LedgerClientError> {
        self.before_write().await;
        self.inner.store_prediction(input).await
    }

    async fn store_prediction_batch(
        &self,
        batch: &PredictionBatch,
    ) -> Result<CommitReceipt, LedgerClientError> {
        self.before_write().await;
        let receipt = self.inner.store_prediction_batch(batch).await?;
        if self.interleave.swap(false, Ordering::SeqCst) {
            let foreign = PredictionInput {
                content_hash: ContentHash::of(b"foreign"),
                category: 0,
                sentiment_score: 0,
                summary: "foreign".to_string(),
            };
            self.inner.store_prediction(foreign).await?;
        }
        Ok(receipt)
    }

    async fn prediction_count(&self) -> Result<u64, LedgerClientError> {
        self.before_read()?;
        self.inner.prediction_count().await
    }

    async fn get_prediction(&self, id: PredictionId) -> Result<Prediction, LedgerClientError> {
        self.before_read()?;
        self.inner.get_prediction(id).await
    }

    async fn get_latest_predictions(&self, count: u64) -> Result<Vec<Prediction>, LedgerClientError> {
        self.before_read()?;
        self.inner.get_latest_predictions(count).await
    }

    async fn verify_prediction(
        &self,
        id: PredictionId,
        content: &str,
    ) -> Result<bool, LedgerClientError> {
        self.before_read()?;
        self.inner.verify_prediction(id, content).await
    }
}

// ============================================================================
// SECTION: Flaky Store
// ============================================================================

/// In-memory store whose writes can be switched to fail.
pub struct FlakyStore {
    /// Backing store.
    pub inner: InMemoryInsightStore,
    /// When set, prepends fail.
    pub failing: AtomicBool,
}

impl FlakyStore {
    /// Creates a store that fails writes while `failing` is set.
    pub fn new(failing: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryInsightStore::new(),
            failing: AtomicBool::new(failing),
        })
    }
}

impl InsightStore for FlakyStore {
    fn prepend(&self, insights: &[AIInsight]) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".to_string()));
        }
        self.inner.prepend(insights)
    }

    fn list(&self, query: &InsightQuery) -> Result<InsightPage, StoreError> {
        self.inner.list(query)
    }

    fn get(&self, id: &InsightId) -> Result<Option<AIInsight>, StoreError> {
        self.inner.get(id)
    }

    fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<AIInsight>, StoreError> {
        self.inner.find_by_content_hash(hash)
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

// ============================================================================
// SECTION: Recording Audit Sink
// ============================================================================

/// Audit sink that keeps every event as JSON.
#[derive(Default)]
pub struct RecordingSink {
    /// Recorded events in emission order.
    pub events: Mutex<Vec<serde_json::Value>>,
}

impl RecordingSink {
    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineAuditSink for RecordingSink {
    fn record_analysis(&self, event: &AnalysisAuditEvent) {
        self.events.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }

    fn record_verification(&self, event: &VerificationAuditEvent) {
        self.events.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }
}
