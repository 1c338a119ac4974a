// crates/chainpulse-core/src/runtime/reconcile.rs
// ============================================================================
// Module: ChainPulse Reconciler
// Description: Finds committed predictions that have no local insight record.
// Purpose: Recover from the window between ledger commit and local persistence.
// Dependencies: serde, tokio, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The reconciler scans the newest ledger records and cross-references each
//! content hash against the insight store. Records with no local counterpart
//! are reported as orphans. It never writes to the ledger or the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::ContentHash;
use crate::core::Prediction;
use crate::core::PredictionId;
use crate::interfaces::InsightStore;
use crate::interfaces::LedgerClient;
use crate::interfaces::StoreError;
use crate::runtime::retry::LedgerCallError;
use crate::runtime::retry::LedgerCallPolicy;
use crate::runtime::retry::bounded_read;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Default number of ledger records scanned.
pub const DEFAULT_RECONCILE_WINDOW: u64 = 100;

/// Committed prediction with no local insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanPrediction {
    /// Ledger index.
    pub prediction_id: PredictionId,
    /// Ledger record.
    pub prediction: Prediction,
}

/// Reconciliation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Ledger count at scan time.
    pub prediction_count: u64,
    /// Records scanned.
    pub scanned: u64,
    /// Orphans, newest first.
    pub orphans: Vec<OrphanPrediction>,
}

/// Reconciliation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A ledger read failed.
    #[error("ledger read failed: {0}")]
    Ledger(#[from] LedgerCallError),
    /// The store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The ledger grew during the scan; retry.
    #[error("ledger count changed during scan ({before} -> {after})")]
    LedgerMoved {
        /// Count before the scan.
        before: u64,
        /// Count after the scan.
        after: u64,
    },
}

// ============================================================================
// SECTION: Reconciler
// ============================================================================

/// Ledger-to-store reconciler.
pub struct Reconciler<L, S> {
    /// Ledger client.
    ledger: L,
    /// Insight store.
    store: Arc<S>,
    /// Read deadline and retries.
    policy: LedgerCallPolicy,
}

impl<L, S> Reconciler<L, S>
where
    L: LedgerClient,
    S: InsightStore + 'static,
{
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(ledger: L, store: Arc<S>, policy: LedgerCallPolicy) -> Self {
        Self {
            ledger,
            store,
            policy,
        }
    }

    /// Scans the newest `window` ledger records for orphans.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when a read fails or the ledger moved mid-scan.
    pub async fn scan(&self, window: u64) -> Result<ReconcileReport, ReconcileError> {
        let before = bounded_read(&self.policy, || self.ledger.prediction_count()).await?;
        let records = bounded_read(&self.policy, || self.ledger.get_latest_predictions(window)).await?;
        let after = bounded_read(&self.policy, || self.ledger.prediction_count()).await?;
        if before != after {
            return Err(ReconcileError::LedgerMoved {
                before,
                after,
            });
        }

        let store = Arc::clone(&self.store);
        let hashes: Vec<ContentHash> = records.iter().map(|record| record.content_hash).collect();
        let known = tokio::task::spawn_blocking(move || {
            hashes
                .iter()
                .map(|hash| store.find_by_content_hash(hash).map(|found| found.is_some()))
                .collect::<Result<Vec<bool>, StoreError>>()
        })
        .await
        .map_err(|err| StoreError::Store(format!("store task join failed: {err}")))??;

        let scanned = records.len() as u64;
        let orphans = records
            .into_iter()
            .zip(known)
            .enumerate()
            .filter(|(_, (_, present))| !present)
            .map(|(offset, (prediction, _))| OrphanPrediction {
                prediction_id: PredictionId::new(before.saturating_sub(1 + offset as u64)),
                prediction,
            })
            .collect();
        Ok(ReconcileReport {
            prediction_count: before,
            scanned,
            orphans,
        })
    }
}
