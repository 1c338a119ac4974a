// crates/chainpulse-config/src/lib.rs
// ============================================================================
// Module: ChainPulse Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for chainpulse.toml semantics.
// Dependencies: chainpulse-core, serde, toml
// ============================================================================

//! ## Overview
//! `chainpulse-config` defines the canonical configuration model for
//! ChainPulse. It provides strict, fail-closed validation and a deterministic
//! example file.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
