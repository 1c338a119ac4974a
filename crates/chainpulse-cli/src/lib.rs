// crates/chainpulse-cli/src/lib.rs
// ============================================================================
// Module: ChainPulse CLI Library
// Description: Shared helpers for the ChainPulse command-line binary.
// Purpose: Expose the ledger state file so it can be tested outside the binary.
// Dependencies: chainpulse-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Support code for the `chainpulse` binary. The local ledger lives in a JSON
//! state file that is rewritten atomically after every committed write.

pub mod state;
