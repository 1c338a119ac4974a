// crates/chainpulse-config/src/config.rs
// ============================================================================
// Module: ChainPulse Configuration
// Description: Configuration loading and validation for ChainPulse.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: chainpulse-core, chainpulse-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The writer identity is the only required value; every other section has
//! defaults. Out-of-range values fail closed instead of being clamped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use chainpulse_core::Address;
use chainpulse_core::CanonicalVersion;
use chainpulse_core::LedgerCallPolicy;
use chainpulse_core::OrchestratorConfig;
use chainpulse_core::runtime::orchestrator::DEFAULT_MAX_BATCH_SIZE;
use chainpulse_core::runtime::orchestrator::HARD_MAX_BATCH_SIZE;
use chainpulse_core::runtime::store::DEFAULT_STORE_CAPACITY;
use chainpulse_store_sqlite::SqliteStoreConfig;
use chainpulse_store_sqlite::SqliteStoreMode;
use chainpulse_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "chainpulse.toml";
/// Environment variable holding the config path.
pub const CONFIG_ENV_VAR: &str = "CHAINPULSE_CONFIG";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum ledger endpoint length.
pub(crate) const MAX_ENDPOINT_LENGTH: usize = 2048;
/// BNB Smart Chain testnet id.
pub(crate) const DEFAULT_CHAIN_ID: u64 = 97;
/// Default local ledger state file.
pub(crate) const DEFAULT_LEDGER_STATE_PATH: &str = "chainpulse-ledger.json";
/// Default `SQLite` insight database.
pub(crate) const DEFAULT_STORE_PATH: &str = "chainpulse.db";
/// Read timeout bounds (ms).
pub(crate) const READ_TIMEOUT_RANGE_MS: (u64, u64) = (100, 60_000);
/// Write timeout bounds (ms).
pub(crate) const WRITE_TIMEOUT_RANGE_MS: (u64, u64) = (100, 300_000);
/// Maximum read retries.
pub(crate) const MAX_READ_RETRIES: u32 = 5;
/// Retry backoff bounds (ms).
pub(crate) const RETRY_BACKOFF_RANGE_MS: (u64, u64) = (1, 10_000);
/// Store capacity bounds.
pub(crate) const STORE_CAPACITY_RANGE: (usize, usize) = (1, 100_000);
/// Maximum `SQLite` busy timeout (ms).
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// ChainPulse configuration root.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainPulseConfig {
    /// Writer identity.
    pub writer: WriterConfig,
    /// Ledger connection settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Analysis pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Insight store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl ChainPulseConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: `path`, then `CHAINPULSE_CONFIG`, then `chainpulse.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.writer.validate()?;
        self.ledger.validate()?;
        self.pipeline.validate()?;
        self.store.validate()?;
        self.audit.validate()
    }

    /// Returns the orchestrator settings derived from this config.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_batch_size: self.pipeline.max_batch_size,
            canonical_version: self.pipeline.canonical_version,
            call_policy: self.ledger.call_policy(),
        }
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Writer identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Address that signs ledger writes.
    pub address: Address,
}

impl WriterConfig {
    /// Validates the writer identity.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_zero() {
            return Err(ConfigError::Invalid("writer.address must be non-zero".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Ledger connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Chain id used for explorer links.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Remote ledger endpoint (http or https).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Deployed ledger contract address.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Local ledger state file.
    #[serde(default = "default_ledger_state_path")]
    pub state_path: PathBuf,
    /// Read deadline in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Write deadline in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Read retry attempts after the first failure.
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    /// First retry backoff in milliseconds (doubles per attempt).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            endpoint: None,
            contract_address: None,
            state_path: default_ledger_state_path(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            read_retries: default_read_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl LedgerConfig {
    /// Validates ledger configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        if self.contract_address.is_some_and(|address| address.is_zero()) {
            return Err(ConfigError::Invalid(
                "ledger.contract_address must be non-zero".to_string(),
            ));
        }
        validate_path_string("ledger.state_path", &self.state_path.to_string_lossy())?;
        check_range("ledger.read_timeout_ms", self.read_timeout_ms, READ_TIMEOUT_RANGE_MS)?;
        check_range("ledger.write_timeout_ms", self.write_timeout_ms, WRITE_TIMEOUT_RANGE_MS)?;
        if self.read_retries > MAX_READ_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "ledger.read_retries must be at most {MAX_READ_RETRIES}"
            )));
        }
        check_range("ledger.retry_backoff_ms", self.retry_backoff_ms, RETRY_BACKOFF_RANGE_MS)
    }

    /// Returns the ledger call policy for these settings.
    #[must_use]
    pub const fn call_policy(&self) -> LedgerCallPolicy {
        LedgerCallPolicy {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            read_retries: self.read_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Analysis pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum drafts per run.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Canonical encoding for new insights.
    #[serde(default)]
    pub canonical_version: CanonicalVersion,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            canonical_version: CanonicalVersion::default(),
        }
    }
}

impl PipelineConfig {
    /// Validates pipeline configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= HARD_MAX_BATCH_SIZE).contains(&self.max_batch_size) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.max_batch_size must be between 1 and {HARD_MAX_BATCH_SIZE}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Insight store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Maximum number of retained insights.
    #[serde(default = "default_store_capacity")]
    pub capacity: usize,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            capacity: default_store_capacity(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.capacity < STORE_CAPACITY_RANGE.0 || self.capacity > STORE_CAPACITY_RANGE.1 {
            return Err(ConfigError::Invalid(format!(
                "store.capacity must be between {} and {}",
                STORE_CAPACITY_RANGE.0, STORE_CAPACITY_RANGE.1
            )));
        }
        check_range("store.busy_timeout_ms", self.busy_timeout_ms, (0, MAX_BUSY_TIMEOUT_MS))
    }

    /// Returns the `SQLite` store settings.
    #[must_use]
    pub fn sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            capacity: self.capacity,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// JSON-lines file; stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the ledger endpoint URL shape.
fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let trimmed = endpoint.trim();
    if trimmed.len() > MAX_ENDPOINT_LENGTH {
        return Err(ConfigError::Invalid("ledger.endpoint exceeds max length".to_string()));
    }
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::Invalid("ledger.endpoint must be an http(s) url".to_string()))?;
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        return Err(ConfigError::Invalid("ledger.endpoint must include a host".to_string()));
    }
    Ok(())
}

/// Checks an integer setting against an inclusive range.
fn check_range(field: &str, value: u64, range: (u64, u64)) -> Result<(), ConfigError> {
    if value < range.0 || value > range.1 {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {} and {}",
            range.0, range.1
        )));
    }
    Ok(())
}

/// Returns the default chain id.
const fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

/// Returns the default local ledger state path.
fn default_ledger_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_STATE_PATH)
}

/// Returns the default read timeout.
const fn default_read_timeout_ms() -> u64 {
    10_000
}

/// Returns the default write timeout.
const fn default_write_timeout_ms() -> u64 {
    60_000
}

/// Returns the default read retry count.
const fn default_read_retries() -> u32 {
    2
}

/// Returns the default retry backoff.
const fn default_retry_backoff_ms() -> u64 {
    250
}

/// Returns the default batch size.
const fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

/// Returns the default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Returns the default store capacity.
const fn default_store_capacity() -> usize {
    DEFAULT_STORE_CAPACITY
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default audit toggle.
const fn default_audit_enabled() -> bool {
    true
}
