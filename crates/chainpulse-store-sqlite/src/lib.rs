// crates/chainpulse-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Insight Store
// Description: Durable InsightStore backend using SQLite.
// Purpose: Persist the bounded, newest-first insight log across restarts.
// Dependencies: chainpulse-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`InsightStore`] implementation. Each
//! insight is stored as canonical JSON with a SHA-256 row digest; reads
//! recompute the digest and fail closed on corruption. Database contents are
//! treated as untrusted input.
//!
//! [`InsightStore`]: chainpulse_core::InsightStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_INSIGHT_BYTES;
pub use store::SqliteInsightStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
