// crates/chainpulse-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and `chainpulse config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for ChainPulse configuration. The example must always
//! pass validation.

/// Returns a canonical example `chainpulse.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[writer]
address = "0x2222222222222222222222222222222222222222"

[ledger]
chain_id = 97
endpoint = "https://data-seed-prebsc-1-s1.binance.org:8545"
# contract_address = "0x0000000000000000000000000000000000000001"
state_path = "chainpulse-ledger.json"
read_timeout_ms = 10000
write_timeout_ms = 60000
read_retries = 2
retry_backoff_ms = 250

[pipeline]
max_batch_size = 5
canonical_version = "v1"

[store]
path = "chainpulse.db"
capacity = 500
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"

[audit]
enabled = true
# path = "chainpulse-audit.jsonl"
"#,
    )
}
