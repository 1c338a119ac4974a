// crates/chainpulse-core/src/interfaces/mod.rs
// ============================================================================
// Module: ChainPulse Interfaces
// Description: Backend-agnostic seams for the ledger, insight storage, and time.
// Purpose: Decouple the pipeline from ledger transports and storage backends.
// Dependencies: async-trait, crate::core
// ============================================================================

//! ## Overview
//! The pipeline talks to three collaborators through these traits:
//! - [`LedgerClient`]: the ledger call surface (async; transports may block).
//! - [`InsightStore`]: the bounded, newest-first insight log (sync; async
//!   callers move calls onto the blocking pool).
//! - [`Clock`]: host time, so runtime logic stays deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::AIInsight;
use crate::core::Category;
use crate::core::CommitReceipt;
use crate::core::ContentHash;
use crate::core::InsightId;
use crate::core::Prediction;
use crate::core::PredictionBatch;
use crate::core::PredictionId;
use crate::core::PredictionInput;

// ============================================================================
// SECTION: Ledger Client
// ============================================================================

/// Ledger client failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerClientError {
    /// The ledger rejected the call (authorization or validation).
    #[error("ledger rejected call: {0}")]
    Rejected(String),
    /// The ledger could not be reached.
    #[error("ledger unreachable: {0}")]
    Unreachable(String),
    /// The requested prediction does not exist.
    #[error("prediction {0} does not exist")]
    NotFound(u64),
}

impl LedgerClientError {
    /// Returns true when a side-effect-free read may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Ledger call surface.
///
/// # Invariants
/// - Write methods return only after the commit finalized or definitively failed.
/// - Read methods never mutate ledger state.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Appends a single prediction and returns its index and receipt.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError`] when the commit is rejected or the ledger is unreachable.
    async fn store_prediction(
        &self,
        input: PredictionInput,
    ) -> Result<(PredictionId, CommitReceipt), LedgerClientError>;

    /// Appends an entire batch atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError`] when the commit is rejected or the ledger is unreachable.
    async fn store_prediction_batch(
        &self,
        batch: &PredictionBatch,
    ) -> Result<CommitReceipt, LedgerClientError>;

    /// Returns the number of committed predictions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError`] when the ledger cannot be read.
    async fn prediction_count(&self) -> Result<u64, LedgerClientError>;

    /// Returns a prediction by index.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError::NotFound`] for out-of-range ids.
    async fn get_prediction(&self, id: PredictionId) -> Result<Prediction, LedgerClientError>;

    /// Returns up to `count` predictions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError`] when the ledger cannot be read.
    async fn get_latest_predictions(&self, count: u64) -> Result<Vec<Prediction>, LedgerClientError>;

    /// Returns whether `content` hashes to the stored content hash at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError::NotFound`] for out-of-range ids.
    async fn verify_prediction(
        &self,
        id: PredictionId,
        content: &str,
    ) -> Result<bool, LedgerClientError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn store_prediction(
        &self,
        input: PredictionInput,
    ) -> Result<(PredictionId, CommitReceipt), LedgerClientError> {
        (**self).store_prediction(input).await
    }

    async fn store_prediction_batch(
        &self,
        batch: &PredictionBatch,
    ) -> Result<CommitReceipt, LedgerClientError> {
        (**self).store_prediction_batch(batch).await
    }

    async fn prediction_count(&self) -> Result<u64, LedgerClientError> {
        (**self).prediction_count().await
    }

    async fn get_prediction(&self, id: PredictionId) -> Result<Prediction, LedgerClientError> {
        (**self).get_prediction(id).await
    }

    async fn get_latest_predictions(&self, count: u64) -> Result<Vec<Prediction>, LedgerClientError> {
        (**self).get_latest_predictions(count).await
    }

    async fn verify_prediction(
        &self,
        id: PredictionId,
        content: &str,
    ) -> Result<bool, LedgerClientError> {
        (**self).verify_prediction(id, content).await
    }
}

// ============================================================================
// SECTION: Insight Store
// ============================================================================

/// Insight store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("insight store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("insight store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("insight store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("insight store invalid data: {0}")]
    Invalid(String),
    /// An insight with this id is already retained.
    #[error("insight id already stored: {0}")]
    DuplicateId(String),
    /// Store reported an error.
    #[error("insight store error: {0}")]
    Store(String),
}

/// Page request against the insight log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsightQuery {
    /// Optional category filter.
    pub category: Option<Category>,
    /// Number of matching records to skip (newest first).
    pub offset: usize,
    /// Maximum records to return.
    pub limit: usize,
}

/// Page of insights plus the total matching count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsightPage {
    /// Records in newest-first order.
    pub items: Vec<AIInsight>,
    /// Total records matching the filter.
    pub total: usize,
}

/// Bounded, newest-first insight log.
///
/// # Invariants
/// - Mutated only by [`InsightStore::prepend`]; records are never edited in place.
/// - Holds at most [`InsightStore::capacity`] records; the oldest are dropped first.
pub trait InsightStore: Send + Sync {
    /// Prepends `insights` (keeping their order) and trims to capacity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] when an id is already retained or
    /// repeats within the batch, or another [`StoreError`] when the write
    /// fails; no partial prepend is visible.
    fn prepend(&self, insights: &[AIInsight]) -> Result<(), StoreError>;

    /// Returns a newest-first page of insights.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn list(&self, query: &InsightQuery) -> Result<InsightPage, StoreError>;

    /// Loads an insight by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn get(&self, id: &InsightId) -> Result<Option<AIInsight>, StoreError>;

    /// Finds the newest insight carrying `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<AIInsight>, StoreError>;

    /// Returns the maximum number of retained records.
    fn capacity(&self) -> usize;
}

impl<T: InsightStore + ?Sized> InsightStore for Arc<T> {
    fn prepend(&self, insights: &[AIInsight]) -> Result<(), StoreError> {
        (**self).prepend(insights)
    }

    fn list(&self, query: &InsightQuery) -> Result<InsightPage, StoreError> {
        (**self).list(query)
    }

    fn get(&self, id: &InsightId) -> Result<Option<AIInsight>, StoreError> {
        (**self).get(id)
    }

    fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<AIInsight>, StoreError> {
        (**self).find_by_content_hash(hash)
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Host time source.
pub trait Clock: Send + Sync {
    /// Returns the current time in unix milliseconds.
    fn now_millis(&self) -> u64;
}
