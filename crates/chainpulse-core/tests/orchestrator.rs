// crates/chainpulse-core/tests/orchestrator.rs
// ============================================================================
// Module: Analysis Orchestrator Tests
// Description: Commit-then-persist ordering, id derivation, and failure paths.
// Purpose: Ensure no local record exists without a finalized commit.
// Dependencies: chainpulse-core, tokio
// ============================================================================

//! ## Overview
//! Drives [`AnalysisOrchestrator`] against a scripted ledger client and a
//! store that can be switched to fail, then checks ledger count, store
//! contents, and the returned error variant for each path.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chainpulse_core::AnalysisOrchestrator;
use chainpulse_core::AnalysisRequest;
use chainpulse_core::InsightQuery;
use chainpulse_core::InsightStore;
use chainpulse_core::InsightVerifier;
use chainpulse_core::LedgerCallPolicy;
use chainpulse_core::MarketSnapshotRef;
use chainpulse_core::OrchestratorConfig;
use chainpulse_core::PipelineError;
use chainpulse_core::PredictionId;
use chainpulse_core::SchemaError;
use chainpulse_core::UnavailableReason;
use chainpulse_core::VerificationOutcome;
use chainpulse_core::runtime::NoopAuditSink;
use common::FlakyStore;
use common::RecordingSink;
use common::ScriptedLedger;
use common::clock;
use common::draft;
use common::seeded_ledger;
use serde_json::json;

type Orchestrator = AnalysisOrchestrator<Arc<ScriptedLedger>, FlakyStore>;

fn fast_policy() -> LedgerCallPolicy {
    LedgerCallPolicy {
        read_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_secs(5),
        read_retries: 1,
        retry_backoff: Duration::from_millis(1),
    }
}

fn orchestrator(ledger: &Arc<ScriptedLedger>, store: &Arc<FlakyStore>, sink: Arc<RecordingSink>) -> Orchestrator {
    let config = OrchestratorConfig {
        call_policy: fast_policy(),
        ..OrchestratorConfig::default()
    };
    AnalysisOrchestrator::new(config, Arc::clone(ledger), Arc::clone(store), clock(), sink).unwrap()
}

fn request(drafts: Vec<chainpulse_core::InsightDraft>) -> AnalysisRequest {
    AnalysisRequest {
        drafts,
        snapshot: None,
    }
}

fn stored(store: &FlakyStore) -> Vec<chainpulse_core::AIInsight> {
    store
        .list(&InsightQuery {
            category: None,
            offset: 0,
            limit: 100,
        })
        .unwrap()
        .items
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn batch_of_two_after_five_gets_ids_five_and_six() {
    let ledger = ScriptedLedger::new(seeded_ledger(5));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());

    let result = orchestrator
        .run(request(vec![draft("TREND", "a"), draft("RISK", "b")]))
        .await
        .unwrap();

    assert_eq!(ledger.count(), 7);
    let ids: Vec<_> = result.insights.iter().map(|insight| insight.prediction_id).collect();
    assert_eq!(ids, vec![Some(PredictionId::new(5)), Some(PredictionId::new(6))]);
    assert!(result.insights.iter().all(|insight| insight.tx_hash == Some(result.receipt.tx_hash)));
    assert_eq!(result.insights[0].id.as_str(), "1700000000123-0");
    assert_eq!(result.insights[0].created_at, "2023-11-14T22:13:20.123Z");

    let persisted = stored(&store);
    assert_eq!(persisted, result.insights);
}

#[tokio::test]
async fn committed_insights_verify() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());
    let result = orchestrator.run(request(vec![draft("WHALE_ALERT", "w")])).await.unwrap();

    let verifier = InsightVerifier::new(Arc::clone(&ledger), fast_policy(), Arc::new(NoopAuditSink));
    assert_eq!(verifier.verify_insight(&result.insights[0]).await, VerificationOutcome::Verified);

    let mut tampered = result.insights[0].clone();
    tampered.draft.title.push('!');
    assert_eq!(verifier.verify_insight(&tampered).await, VerificationOutcome::Mismatch);
}

#[tokio::test]
async fn newest_run_is_first_in_store() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());
    orchestrator.run(request(vec![draft("TREND", "old")])).await.unwrap();
    orchestrator.run(request(vec![draft("TREND", "new1"), draft("RISK", "new2")])).await.unwrap();

    let titles: Vec<_> = stored(&store).into_iter().map(|insight| insight.draft.title).collect();
    assert_eq!(titles, vec!["title new1", "title new2", "title old"]);
}

// ============================================================================
// SECTION: Pre-Commit Failures
// ============================================================================

#[tokio::test]
async fn unknown_category_aborts_before_any_ledger_call() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(&ledger, &store, Arc::clone(&sink));

    let err = orchestrator
        .run(request(vec![draft("TREND", "a"), draft("UNKNOWN_CATEGORY", "b")]))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::SchemaInvalid(SchemaError::UnknownCategory("UNKNOWN_CATEGORY".to_string())));
    assert_eq!(ledger.calls(), 0);
    assert_eq!(ledger.count(), 0);
    assert!(stored(&store).is_empty());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["outcome"], "rejected");
    assert_eq!(events[0]["error_kind"], "schema_invalid");
}

#[tokio::test]
async fn oversized_batch_is_schema_invalid() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());
    let drafts = (0 .. 6).map(|index| draft("TREND", &index.to_string())).collect();

    let err = orchestrator.run(request(drafts)).await.unwrap_err();
    assert!(matches!(err, PipelineError::SchemaInvalid(SchemaError::BatchSize { actual: 6, .. })));
    assert_eq!(ledger.calls(), 0);
}

#[tokio::test]
async fn ledger_rejection_persists_nothing() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());
    let mut bad = draft("RISK", "long");
    // 67 three-byte characters: within the 200-char schema bound, over the 200-byte ledger bound.
    bad.summary = "\u{20ac}".repeat(67);

    let err = orchestrator.run(request(vec![draft("TREND", "ok"), bad])).await.unwrap_err();
    assert_eq!(err, PipelineError::LedgerWriteRejected("Summary too long".to_string()));
    assert_eq!(ledger.count(), 0);
    assert!(stored(&store).is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_timeout_persists_nothing() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    *ledger.write_delay.lock().unwrap() = Some(Duration::from_secs(60));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());

    let err = orchestrator.run(request(vec![draft("TREND", "a")])).await.unwrap_err();
    assert_eq!(err, PipelineError::LedgerTimeout(Duration::from_secs(5)));
    assert_eq!(ledger.count(), 0);
    assert!(stored(&store).is_empty());
}

// ============================================================================
// SECTION: Post-Commit Failures
// ============================================================================

#[tokio::test]
async fn store_failure_returns_committed_batch_for_retry() {
    let ledger = ScriptedLedger::new(seeded_ledger(3));
    let store = FlakyStore::new(true);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(&ledger, &store, Arc::clone(&sink));

    let err = orchestrator
        .run(request(vec![draft("TREND", "a"), draft("RISK", "b")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "committed_not_persisted");
    assert_eq!(ledger.count(), 5);
    assert!(stored(&store).is_empty());

    let batch = err.unpersisted_batch().unwrap().clone();
    assert!(batch.ids_assigned);
    assert_eq!(batch.insights[0].prediction_id, Some(PredictionId::new(3)));
    assert_eq!(sink.events()[0]["outcome"], "committed_not_persisted");

    store.failing.store(false, Ordering::SeqCst);
    let result = orchestrator.retry_persist(batch).await.unwrap();
    assert_eq!(stored(&store), result.insights);
}

#[tokio::test]
async fn foreign_append_after_commit_is_an_id_conflict() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    ledger.interleave.store(true, Ordering::SeqCst);
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());

    let err = orchestrator
        .run(request(vec![draft("TREND", "a"), draft("RISK", "b")]))
        .await
        .unwrap_err();
    match &err {
        PipelineError::IdAssignmentConflict { batch, id, .. } => {
            assert_eq!(*id, PredictionId::new(1));
            assert!(!batch.ids_assigned);
            assert!(batch.insights.iter().all(|insight| insight.prediction_id.is_none()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(stored(&store).is_empty());

    let batch = err.unpersisted_batch().unwrap().clone();
    let retry = orchestrator.retry_persist(batch).await.unwrap_err();
    assert_eq!(retry.kind(), "committed_not_persisted");
}

#[tokio::test]
async fn unreachable_count_read_after_commit_keeps_the_batch() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    ledger.reads_down.store(true, Ordering::SeqCst);
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());

    let err = orchestrator.run(request(vec![draft("TREND", "a")])).await.unwrap_err();
    let batch = err.unpersisted_batch().unwrap();
    assert!(!batch.ids_assigned);
    assert_eq!(batch.insights[0].tx_hash, Some(batch.receipt.tx_hash));
    assert_eq!(ledger.count(), 1);
    assert!(stored(&store).is_empty());
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_never_share_ids() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = Arc::new(orchestrator(&ledger, &store, Arc::default()));

    let mut handles = Vec::new();
    for run in 0 .. 4 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let drafts = vec![draft("TREND", &format!("{run}-a")), draft("RISK", &format!("{run}-b"))];
            orchestrator.run(request(drafts)).await
        }));
    }

    let mut ids = Vec::new();
    let mut insight_ids = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        let first = result.insights[0].prediction_id.unwrap().get();
        let second = result.insights[1].prediction_id.unwrap().get();
        assert_eq!(second, first + 1);
        ids.extend([first, second]);
        insight_ids.extend(result.insights.iter().map(|insight| insight.id.clone()));
    }
    ids.sort_unstable();
    assert_eq!(ids, (0 .. 8).collect::<Vec<u64>>());
    assert_eq!(ledger.count(), 8);

    // The clock is frozen, so only the per-run stamp keeps insight ids apart.
    insight_ids.sort();
    insight_ids.dedup();
    assert_eq!(insight_ids.len(), 8);
    for id in &insight_ids {
        assert_eq!(store.get(id).unwrap().map(|insight| insight.id), Some(id.clone()));
    }
}

#[tokio::test]
async fn id_already_held_by_the_store_is_restamped() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let first = orchestrator(&ledger, &store, Arc::default());
    let earlier = first.run(request(vec![draft("TREND", "a")])).await.unwrap();
    assert_eq!(earlier.insights[0].id.as_str(), "1700000000123-0");

    // A second writer with the same clock starts from the same stamp.
    let second = orchestrator(&ledger, &store, Arc::default());
    let later = second.run(request(vec![draft("RISK", "b")])).await.unwrap();
    assert_eq!(later.insights[0].id.as_str(), "1700000000124-0");
    assert_eq!(later.insights[0].prediction_id, Some(PredictionId::new(1)));
    assert_eq!(stored(&store).len(), 2);
}

// ============================================================================
// SECTION: Verification Availability
// ============================================================================

#[tokio::test]
async fn verification_is_unavailable_without_id_or_ledger() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let orchestrator = orchestrator(&ledger, &store, Arc::default());
    let result = orchestrator.run(request(vec![draft("TREND", "a")])).await.unwrap();
    let sink = Arc::new(RecordingSink::default());
    let verifier = InsightVerifier::new(Arc::clone(&ledger), fast_policy(), Arc::clone(&sink) as _);

    let mut uncommitted = result.insights[0].clone();
    uncommitted.prediction_id = None;
    assert_eq!(
        verifier.verify_insight(&uncommitted).await,
        VerificationOutcome::Unavailable(UnavailableReason::NoPredictionId)
    );

    ledger.reads_down.store(true, Ordering::SeqCst);
    let outcome = verifier.verify_insight(&result.insights[0]).await;
    assert_eq!(outcome, VerificationOutcome::Unavailable(UnavailableReason::LedgerUnreachable));
    assert!(!outcome.is_verified());

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["status"], "unavailable");
    assert_eq!(events[1]["reason"], "ledger_unreachable");
}

#[tokio::test]
async fn snapshot_reference_reaches_audit_without_draft_text() {
    let ledger = ScriptedLedger::new(seeded_ledger(0));
    let store = FlakyStore::new(false);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(&ledger, &store, Arc::clone(&sink));
    let snapshot = MarketSnapshotRef::from_snapshot("defillama", 1_700_000_000_000, &json!({"tvl": 1}))
        .unwrap();

    orchestrator
        .run(AnalysisRequest {
            drafts: vec![draft("MARKET_INSIGHT", "secret-text")],
            snapshot: Some(snapshot.clone()),
        })
        .await
        .unwrap();

    let events = sink.events();
    assert_eq!(events[0]["outcome"], "committed");
    assert_eq!(events[0]["first_prediction_id"], 0);
    assert_eq!(events[0]["snapshot"]["digest"], json!(snapshot.digest.to_hex()));
    assert!(!events[0].to_string().contains("secret-text"));
}
