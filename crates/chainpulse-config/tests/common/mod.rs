// crates/chainpulse-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for chainpulse-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use chainpulse_config::ChainPulseConfig;
use chainpulse_config::ConfigError;

/// Writer section shared by every fixture.
pub const WRITER_TOML: &str = "[writer]\naddress = \"0x2222222222222222222222222222222222222222\"\n";

/// Result alias used by config suites.
pub type TestResult = Result<(), String>;

/// Parses a TOML string into a `ChainPulseConfig` without validation.
pub fn config_from_toml(toml_str: &str) -> Result<ChainPulseConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<ChainPulseConfig, toml::de::Error> {
    config_from_toml(WRITER_TOML)
}

/// Asserts that validation failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
