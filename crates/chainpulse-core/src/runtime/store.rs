// crates/chainpulse-core/src/runtime/store.rs
// ============================================================================
// Module: ChainPulse In-Memory Insight Store
// Description: Bounded, newest-first insight log held in memory.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryInsightStore`] implements [`InsightStore`] for tests and local
//! runs. Writes prepend a whole batch under one lock and trim the tail, so a
//! reader never observes half a batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::AIInsight;
use crate::core::ContentHash;
use crate::core::InsightId;
use crate::interfaces::InsightPage;
use crate::interfaces::InsightQuery;
use crate::interfaces::InsightStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default number of retained insights.
pub const DEFAULT_STORE_CAPACITY: usize = 500;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory insight log.
#[derive(Debug, Clone)]
pub struct InMemoryInsightStore {
    /// Records newest-first, protected by a mutex.
    records: Arc<Mutex<VecDeque<AIInsight>>>,
    /// Maximum retained records.
    capacity: usize,
}

impl Default for InMemoryInsightStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInsightStore {
    /// Creates a store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }

    /// Creates a store retaining at most `capacity` records (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Returns the number of retained records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// Returns true when no records are retained.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    /// Locks the record list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<AIInsight>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Store("insight store mutex poisoned".to_string()))
    }
}

impl InsightStore for InMemoryInsightStore {
    fn prepend(&self, insights: &[AIInsight]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        for (index, insight) in insights.iter().enumerate() {
            let repeated = insights[.. index].iter().any(|earlier| earlier.id == insight.id);
            if repeated || guard.iter().any(|retained| retained.id == insight.id) {
                return Err(StoreError::DuplicateId(insight.id.to_string()));
            }
        }
        for insight in insights.iter().rev() {
            guard.push_front(insight.clone());
        }
        guard.truncate(self.capacity);
        drop(guard);
        Ok(())
    }

    fn list(&self, query: &InsightQuery) -> Result<InsightPage, StoreError> {
        let guard = self.lock()?;
        let matching: Vec<&AIInsight> = guard
            .iter()
            .filter(|insight| {
                query.category.is_none_or(|category| insight.draft.category == category.name())
            })
            .collect();
        let total = matching.len();
        let items = matching.into_iter().skip(query.offset).take(query.limit).cloned().collect();
        drop(guard);
        Ok(InsightPage {
            items,
            total,
        })
    }

    fn get(&self, id: &InsightId) -> Result<Option<AIInsight>, StoreError> {
        Ok(self.lock()?.iter().find(|insight| &insight.id == id).cloned())
    }

    fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<AIInsight>, StoreError> {
        Ok(self.lock()?.iter().find(|insight| &insight.content_hash == hash).cloned())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
