// crates/chainpulse-cli/src/main.rs
// ============================================================================
// Module: ChainPulse CLI Entry Point
// Description: Command dispatcher for ledger, analysis, and verification tasks.
// Purpose: Drive the provenance pipeline against a local ledger and SQLite store.
// Dependencies: clap, chainpulse-core, chainpulse-config, chainpulse-store-sqlite, tokio.
// ============================================================================

//! ## Overview
//! The ChainPulse CLI manages the local prediction ledger, triggers analysis
//! runs from draft files, lists committed records, verifies stored insights,
//! and reports orphaned ledger records. Successful commands write canonical
//! JSON to stdout; failures write one line to stderr and exit non-zero.
//! Security posture: input files are untrusted and read with hard size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chainpulse_cli::state::LedgerStateError;
use chainpulse_cli::state::LedgerStateFile;
use chainpulse_config::AuditConfig;
use chainpulse_config::ChainPulseConfig;
use chainpulse_config::config_toml_example;
use chainpulse_core::Address;
use chainpulse_core::Clock;
use chainpulse_core::InsightId;
use chainpulse_core::MarketSnapshotRef;
use chainpulse_core::hashing::canonical_json_bytes;
use chainpulse_core::runtime::AnalysisOrchestrator;
use chainpulse_core::runtime::FileAuditSink;
use chainpulse_core::runtime::InsightVerifier;
use chainpulse_core::runtime::LocalLedgerClient;
use chainpulse_core::runtime::NoopAuditSink;
use chainpulse_core::runtime::PipelineAuditSink;
use chainpulse_core::runtime::PredictionLedger;
use chainpulse_core::runtime::ProvenanceService;
use chainpulse_core::runtime::ServiceError;
use chainpulse_core::runtime::StderrAuditSink;
use chainpulse_core::runtime::SystemClock;
use chainpulse_core::runtime::explorer_tx_url;
use chainpulse_core::runtime::service::MAX_VERIFY_CONTENT_CHARS;
use chainpulse_store_sqlite::SqliteInsightStore;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a drafts JSON input.
const MAX_DRAFTS_BYTES: usize = 1024 * 1024;
/// Maximum size of a market snapshot JSON input.
const MAX_SNAPSHOT_BYTES: usize = 8 * 1024 * 1024;
/// Maximum size of a verify content input (four bytes per character).
const MAX_CONTENT_BYTES: usize = MAX_VERIFY_CONTENT_CHARS * 4;
/// Default reconciliation window.
const DEFAULT_RECONCILE_WINDOW: u64 = 100;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "chainpulse", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `CHAINPULSE_CONFIG`, then chainpulse.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Local ledger management.
    Ledger {
        /// Selected ledger subcommand.
        #[command(subcommand)]
        command: LedgerCommand,
    },
    /// Commit a batch of insight drafts and persist the results.
    Analyze(AnalyzeCommand),
    /// List the newest ledger records.
    Predictions(PredictionsCommand),
    /// List stored insights.
    Insights(InsightsCommand),
    /// Verify content against the ledger.
    Verify(VerifyCommand),
    /// Report ledger records with no stored insight.
    Reconcile(ReconcileCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Deploy a new local ledger state file.
    Init(LedgerInitCommand),
    /// Show ledger ownership and counters.
    Show,
    /// Rotate the designated agent (owner only).
    SetAgent(LedgerSetAgentCommand),
    /// Hand ownership to another address (owner only).
    TransferOwnership(LedgerTransferCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print a canonical example configuration.
    Example,
}

/// Arguments for ledger deployment.
#[derive(Args, Debug)]
struct LedgerInitCommand {
    /// Ledger owner (defaults to the configured writer).
    #[arg(long, value_name = "ADDRESS")]
    owner: Option<Address>,
    /// Designated agent (defaults to the configured writer).
    #[arg(long, value_name = "ADDRESS")]
    agent: Option<Address>,
}

/// Arguments for agent rotation.
#[derive(Args, Debug)]
struct LedgerSetAgentCommand {
    /// New designated agent.
    #[arg(long, value_name = "ADDRESS")]
    agent: Address,
    /// Calling identity (defaults to the configured writer).
    #[arg(long, value_name = "ADDRESS")]
    caller: Option<Address>,
}

/// Arguments for ownership transfer.
#[derive(Args, Debug)]
struct LedgerTransferCommand {
    /// New owner.
    #[arg(long, value_name = "ADDRESS")]
    new_owner: Address,
    /// Calling identity (defaults to the configured writer).
    #[arg(long, value_name = "ADDRESS")]
    caller: Option<Address>,
}

/// Arguments for an analysis run.
#[derive(Args, Debug)]
struct AnalyzeCommand {
    /// Generator response file (`{"insights": [...]}`, 1 to 5 drafts).
    #[arg(long, value_name = "PATH")]
    drafts: PathBuf,
    /// Optional market snapshot JSON recorded by digest in the audit log.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Source label for the snapshot.
    #[arg(long, value_name = "LABEL", default_value = "defillama", requires = "snapshot")]
    snapshot_source: String,
}

/// Arguments for listing ledger records.
#[derive(Args, Debug)]
struct PredictionsCommand {
    /// Number of records (default 20, at most 100).
    #[arg(long, value_name = "N")]
    limit: Option<u64>,
}

/// Arguments for listing insights.
#[derive(Args, Debug)]
struct InsightsCommand {
    /// Page number (1-based).
    #[arg(long, value_name = "N")]
    page: Option<usize>,
    /// Page size (default 10, at most 100).
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
    /// Category filter (TREND, RISK, WHALE_ALERT, MARKET_INSIGHT).
    #[arg(long, value_name = "NAME")]
    category: Option<String>,
}

/// Arguments for verification.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Stored insight id to verify.
    #[arg(
        long,
        value_name = "ID",
        conflicts_with_all = ["prediction_id", "content"],
        required_unless_present = "prediction_id"
    )]
    insight: Option<String>,
    /// Ledger index to check.
    #[arg(long, value_name = "N", requires = "content")]
    prediction_id: Option<u64>,
    /// File holding the exact content bytes that were committed.
    #[arg(long, value_name = "PATH", requires = "prediction_id")]
    content: Option<PathBuf>,
}

/// Arguments for reconciliation.
#[derive(Args, Debug)]
struct ReconcileCommand {
    /// Number of newest ledger records to scan.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RECONCILE_WINDOW)]
    window: u64,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Ledger summary printed by ledger commands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSummary {
    /// State file location.
    state_path: String,
    /// Configured chain id.
    chain_id: u64,
    /// Configured contract address, if any.
    contract_address: Option<Address>,
    /// Current owner.
    owner: Option<Address>,
    /// Designated agent.
    agent: Address,
    /// Committed record count.
    prediction_count: u64,
    /// Successful write counter.
    nonce: u64,
}

impl LedgerSummary {
    /// Builds a summary from ledger state and config.
    fn new(config: &ChainPulseConfig, state: &LedgerStateFile, ledger: &PredictionLedger) -> Self {
        Self {
            state_path: state.path().display().to_string(),
            chain_id: config.ledger.chain_id,
            contract_address: config.ledger.contract_address,
            owner: ledger.owner(),
            agent: ledger.agent_address(),
            prediction_count: ledger.prediction_count(),
            nonce: ledger.nonce(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

impl From<LedgerStateError> for CliError {
    fn from(error: LedgerStateError) -> Self {
        Self::new(error.to_string())
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// I/O error while reading.
    Io(std::io::Error),
    /// Input exceeded the configured size limit.
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ledger {
            command,
        } => command_ledger(config_path, command),
        Commands::Analyze(command) => command_analyze(config_path, command).await,
        Commands::Predictions(command) => command_predictions(config_path, &command).await,
        Commands::Insights(command) => command_insights(config_path, &command).await,
        Commands::Verify(command) => command_verify(config_path, command).await,
        Commands::Reconcile(command) => command_reconcile(config_path, &command).await,
        Commands::Config {
            command,
        } => command_config(config_path, &command),
    }
}

// ============================================================================
// SECTION: Ledger Commands
// ============================================================================

/// Dispatches ledger subcommands.
fn command_ledger(config_path: Option<&Path>, command: LedgerCommand) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let state = LedgerStateFile::new(&config.ledger.state_path);
    let writer = config.writer.address;
    let ledger = match command {
        LedgerCommand::Init(command) => {
            let owner = command.owner.unwrap_or(writer);
            let agent = command.agent.unwrap_or(writer);
            let ledger = PredictionLedger::deploy(owner, agent)
                .map_err(|err| CliError::new(format!("ledger deploy failed: {err}")))?;
            state.create(&ledger).map_err(|err| CliError::new(err.to_string()))?;
            ledger
        }
        LedgerCommand::Show => load_ledger(&state)?,
        LedgerCommand::SetAgent(command) => state.update(|ledger| {
            ledger
                .set_agent_address(&command.caller.unwrap_or(writer), command.agent)
                .map_err(|err| CliError::new(format!("set-agent rejected: {err}")))
        })?,
        LedgerCommand::TransferOwnership(command) => state.update(|ledger| {
            ledger
                .transfer_ownership(&command.caller.unwrap_or(writer), command.new_owner)
                .map_err(|err| CliError::new(format!("transfer-ownership rejected: {err}")))
        })?,
    };
    write_canonical_json(&LedgerSummary::new(&config, &state, &ledger))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads the ledger state file.
fn load_ledger(state: &LedgerStateFile) -> CliResult<PredictionLedger> {
    state.load().map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Pipeline Commands
// ============================================================================

/// Executes an analysis run.
async fn command_analyze(config_path: Option<&Path>, command: AnalyzeCommand) -> CliResult<ExitCode> {
    let runtime = CliRuntime::build(config_path)?;
    let response = read_text(&command.drafts, "drafts", MAX_DRAFTS_BYTES)?;
    let snapshot = match &command.snapshot {
        Some(path) => {
            let value: Value = read_json(path, "snapshot", MAX_SNAPSHOT_BYTES)?;
            let reference =
                MarketSnapshotRef::from_snapshot(command.snapshot_source, SystemClock.now_millis(), &value)
                    .map_err(|err| CliError::new(format!("snapshot digest failed: {err}")))?;
            Some(reference)
        }
        None => None,
    };
    let response = runtime
        .service
        .trigger_analysis_response(&response, snapshot)
        .await
        .map_err(|err| analysis_error(&err))?;
    let mut output = serde_json::to_value(&response)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    if let Value::Object(map) = &mut output {
        map.insert(
            "explorerUrl".to_string(),
            Value::String(explorer_tx_url(runtime.config.ledger.chain_id, &response.tx_hash)),
        );
    }
    write_canonical_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Lists ledger records.
async fn command_predictions(config_path: Option<&Path>, command: &PredictionsCommand) -> CliResult<ExitCode> {
    let runtime = CliRuntime::build(config_path)?;
    let response = runtime.service.list_predictions(command.limit).await.map_err(service_error)?;
    write_canonical_json(&response)?;
    Ok(ExitCode::SUCCESS)
}

/// Lists stored insights.
async fn command_insights(config_path: Option<&Path>, command: &InsightsCommand) -> CliResult<ExitCode> {
    let runtime = CliRuntime::build(config_path)?;
    let response = runtime
        .service
        .list_insights(command.page, command.limit, command.category.as_deref())
        .await
        .map_err(service_error)?;
    write_canonical_json(&response)?;
    Ok(ExitCode::SUCCESS)
}

/// Verifies a stored insight or raw content.
async fn command_verify(config_path: Option<&Path>, command: VerifyCommand) -> CliResult<ExitCode> {
    let runtime = CliRuntime::build(config_path)?;
    let response = match (command.insight, command.prediction_id, command.content) {
        (Some(insight), _, _) => runtime.service.verify_insight(&InsightId::new(insight)).await,
        (None, Some(prediction_id), Some(path)) => {
            let content = read_content(&path)?;
            runtime.service.verify(prediction_id, &content).await
        }
        _ => {
            return Err(CliError::new(
                "verify requires --insight or --prediction-id with --content".to_string(),
            ));
        }
    }
    .map_err(service_error)?;
    write_canonical_json(&response)?;
    Ok(ExitCode::SUCCESS)
}

/// Scans for orphaned ledger records.
async fn command_reconcile(config_path: Option<&Path>, command: &ReconcileCommand) -> CliResult<ExitCode> {
    let runtime = CliRuntime::build(config_path)?;
    let report = runtime.service.reconcile(command.window).await.map_err(service_error)?;
    write_canonical_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(config_path: Option<&Path>, command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate => {
            let _config = load_config(config_path)?;
            write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        ConfigCommand::Example => {
            write_stdout_bytes(config_toml_example().as_bytes())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Runtime Wiring
// ============================================================================

/// Fully wired service for pipeline commands.
struct CliRuntime {
    /// Loaded configuration.
    config: ChainPulseConfig,
    /// Provenance service over the local ledger and `SQLite` store.
    service: ProvenanceService<LocalLedgerClient, SqliteInsightStore>,
}

impl CliRuntime {
    /// Loads config, ledger state, and the insight store.
    fn build(config_path: Option<&Path>) -> CliResult<Self> {
        let config = load_config(config_path)?;
        let state = LedgerStateFile::new(&config.ledger.state_path);
        let ledger = load_ledger(&state)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = LocalLedgerClient::new(ledger, config.writer.address, Arc::clone(&clock))
            .with_sink(Arc::new(state));
        let store = SqliteInsightStore::new(config.store.sqlite_config())
            .map_err(|err| CliError::new(format!("insight store unavailable: {err}")))?;
        let audit = audit_sink(&config.audit)?;
        let orchestrator = AnalysisOrchestrator::new(
            config.orchestrator_config(),
            client.clone(),
            Arc::new(store),
            clock,
            Arc::clone(&audit),
        )
        .map_err(|err| CliError::new(err.to_string()))?;
        let verifier = InsightVerifier::new(client, config.ledger.call_policy(), audit);
        Ok(Self {
            config,
            service: ProvenanceService::new(orchestrator, verifier),
        })
    }
}

/// Loads and validates configuration.
fn load_config(config_path: Option<&Path>) -> CliResult<ChainPulseConfig> {
    ChainPulseConfig::load(config_path).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Selects the audit sink for the configured destination.
fn audit_sink(config: &AuditConfig) -> CliResult<Arc<dyn PipelineAuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(path)
                .map_err(|err| CliError::new(format!("failed to open audit log: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Maps a failed analysis run to the public message plus a stable label.
fn analysis_error(err: &ServiceError) -> CliError {
    match err.pipeline_detail() {
        Some(detail) => {
            let mut message = format!("{err} ({})", detail.kind());
            if let Some(batch) = detail.unpersisted_batch() {
                message.push_str(&format!(
                    "; batch committed as {}, run `chainpulse reconcile`",
                    batch.receipt.tx_hash
                ));
            }
            CliError::new(message)
        }
        None => CliError::new(err.to_string()),
    }
}

/// Maps a service failure to a CLI error.
fn service_error(err: ServiceError) -> CliError {
    CliError::new(err.to_string())
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Formats a bounded read failure.
fn read_error(err: ReadLimitError, kind: &str, path: &Path) -> CliError {
    match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read {kind} from {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{kind} input {} is too large ({size} > {limit} bytes)",
            path.display()
        )),
    }
}

/// Reads and decodes a JSON input file.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path, kind: &str, max_bytes: usize) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, max_bytes).map_err(|err| read_error(err, kind, path))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("failed to parse {kind} from {}: {err}", path.display())))
}

/// Reads verify content as exact UTF-8 text.
fn read_content(path: &Path) -> CliResult<String> {
    read_text(path, "content", MAX_CONTENT_BYTES)
}

/// Reads a bounded input file as UTF-8 text.
fn read_text(path: &Path, kind: &str, max_bytes: usize) -> CliResult<String> {
    let bytes = read_bytes_with_limit(path, max_bytes).map_err(|err| read_error(err, kind, path))?;
    String::from_utf8(bytes).map_err(|_| CliError::new(format!("{kind} {} must be utf-8", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes canonical JSON to stdout.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes =
        canonical_json_bytes(value).map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
