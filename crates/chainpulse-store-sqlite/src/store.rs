// crates/chainpulse-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Insight Store
// Description: Durable InsightStore backed by SQLite.
// Purpose: Persist insights newest-first with integrity digests and a capacity cap.
// Dependencies: chainpulse-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Insights live in a single table ordered by an autoincrement sequence; a
//! higher sequence is newer. A prepend inserts the batch in reverse so the
//! first insight of the batch ends up newest, then trims everything beyond
//! the configured capacity, all inside one transaction. Every row carries a
//! SHA-256 digest of its canonical JSON which is checked on every read.

// ============================================================================//
// SECTION: Imports
// ============================================================================//

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use chainpulse_core::AIInsight;
use chainpulse_core::ContentHash;
use chainpulse_core::InsightId;
use chainpulse_core::InsightPage;
use chainpulse_core::InsightQuery;
use chainpulse_core::InsightStore;
use chainpulse_core::StoreError;
use chainpulse_core::hashing::DEFAULT_HASH_ALGORITHM;
use chainpulse_core::hashing::HashAlgorithm;
use chainpulse_core::hashing::canonical_json_bytes;
use chainpulse_core::hashing::hash_bytes;
use chainpulse_core::runtime::store::DEFAULT_STORE_CAPACITY;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================//
// SECTION: Constants
// ============================================================================//

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum canonical JSON size of one stored insight.
pub const MAX_INSIGHT_BYTES: usize = 256 * 1024;

// ============================================================================//
// SECTION: Config
// ============================================================================//

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` insight store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Maximum number of retained insights.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Returns a config for `path` with default settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: DEFAULT_STORE_CAPACITY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default insight capacity.
const fn default_capacity() -> usize {
    DEFAULT_STORE_CAPACITY
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================//
// SECTION: Errors
// ============================================================================//

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Insight id already retained.
    #[error("sqlite store duplicate insight id: {0}")]
    DuplicateId(String),
    /// Insight payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::DuplicateId(id) => Self::DuplicateId(id),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "insight_json exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error onto [`SqliteStoreError::Db`].
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn db(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

/// Maps an insert failure, reporting unique-id violations as duplicates.
fn insert_error(err: rusqlite::Error, insight: &AIInsight) -> SqliteStoreError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            SqliteStoreError::DuplicateId(insight.id.to_string())
        }
        other => db(other),
    }
}

// ============================================================================//
// SECTION: Store
// ============================================================================//

/// Raw row read back from the insights table.
struct StoredRow {
    /// Insight id column.
    insight_id: String,
    /// Canonical JSON payload.
    payload: Vec<u8>,
    /// Stored digest (hex).
    hash: String,
    /// Stored digest algorithm label.
    algorithm: String,
}

/// `SQLite`-backed insight store.
#[derive(Clone)]
pub struct SqliteInsightStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteInsightStore {
    /// Opens an `SQLite`-backed insight store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the configuration is invalid or the
    /// database cannot be opened or initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if config.capacity == 0 {
            return Err(SqliteStoreError::Invalid("capacity must be greater than zero".to_string()));
        }
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the number of stored insights.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the count query fails.
    pub fn len(&self) -> Result<usize, SqliteStoreError> {
        let guard = self.lock()?;
        let count: i64 =
            guard.query_row("SELECT COUNT(*) FROM insights", params![], |row| row.get(0)).map_err(db)?;
        drop(guard);
        usize::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative row count".to_string()))
    }

    /// Returns true when no insight is stored.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the count query fails.
    pub fn is_empty(&self) -> Result<bool, SqliteStoreError> {
        Ok(self.len()? == 0)
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Inserts a batch newest-first and trims to capacity in one transaction.
    fn prepend_insights(&self, insights: &[AIInsight]) -> Result<(), SqliteStoreError> {
        let mut rows = Vec::with_capacity(insights.len());
        for insight in insights {
            let payload =
                canonical_json_bytes(insight).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            if payload.len() > MAX_INSIGHT_BYTES {
                return Err(SqliteStoreError::TooLarge {
                    max_bytes: MAX_INSIGHT_BYTES,
                    actual_bytes: payload.len(),
                });
            }
            let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &payload);
            rows.push((insight, payload, digest));
        }
        let capacity = i64::try_from(self.config.capacity)
            .map_err(|_| SqliteStoreError::Invalid("capacity too large".to_string()))?;
        let saved_at = unix_millis();

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        for (insight, payload, digest) in rows.iter().rev() {
            tx.execute(
                "INSERT INTO insights (insight_id, category, content_hash, insight_json, \
                 row_hash, hash_algorithm, saved_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    insight.id.as_str(),
                    insight.draft.category,
                    insight.content_hash.to_hex(),
                    payload,
                    digest.value,
                    digest.algorithm.label(),
                    saved_at
                ],
            )
            .map_err(|err| insert_error(err, insight))?;
        }
        tx.execute(
            "DELETE FROM insights WHERE seq NOT IN (SELECT seq FROM insights ORDER BY seq DESC \
             LIMIT ?1)",
            params![capacity],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(())
    }

    /// Returns a newest-first page.
    fn list_insights(&self, query: &InsightQuery) -> Result<InsightPage, SqliteStoreError> {
        let category = query.category.map(|category| category.name());
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let (total, rows) = {
            let guard = self.lock()?;
            let total: i64 = guard
                .query_row(
                    "SELECT COUNT(*) FROM insights WHERE (?1 IS NULL OR category = ?1)",
                    params![category],
                    |row| row.get(0),
                )
                .map_err(db)?;
            let mut statement = guard
                .prepare(
                    "SELECT insight_id, insight_json, row_hash, hash_algorithm FROM insights \
                     WHERE (?1 IS NULL OR category = ?1) ORDER BY seq DESC LIMIT ?2 OFFSET ?3",
                )
                .map_err(db)?;
            let rows = statement
                .query_map(params![category, limit, offset], read_row)
                .map_err(db)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db)?;
            drop(statement);
            drop(guard);
            (total, rows)
        };
        let total =
            usize::try_from(total).map_err(|_| SqliteStoreError::Corrupt("negative row count".to_string()))?;
        let items = rows.into_iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(InsightPage {
            items,
            total,
        })
    }

    /// Loads the newest row matching `column = value`.
    fn find_one(&self, column: FindColumn, value: &str) -> Result<Option<AIInsight>, SqliteStoreError> {
        let sql = match column {
            FindColumn::InsightId => {
                "SELECT insight_id, insight_json, row_hash, hash_algorithm FROM insights WHERE \
                 insight_id = ?1 ORDER BY seq DESC LIMIT 1"
            }
            FindColumn::ContentHash => {
                "SELECT insight_id, insight_json, row_hash, hash_algorithm FROM insights WHERE \
                 content_hash = ?1 ORDER BY seq DESC LIMIT 1"
            }
        };
        let row = {
            let guard = self.lock()?;
            let row = guard.query_row(sql, params![value], read_row).optional().map_err(db)?;
            drop(guard);
            row
        };
        row.map(decode_row).transpose()
    }
}

/// Lookup keys supported by [`SqliteInsightStore::find_one`].
#[derive(Clone, Copy)]
enum FindColumn {
    /// Locally generated id.
    InsightId,
    /// Committed content hash.
    ContentHash,
}

impl InsightStore for SqliteInsightStore {
    fn prepend(&self, insights: &[AIInsight]) -> Result<(), StoreError> {
        self.prepend_insights(insights).map_err(StoreError::from)
    }

    fn list(&self, query: &InsightQuery) -> Result<InsightPage, StoreError> {
        self.list_insights(query).map_err(StoreError::from)
    }

    fn get(&self, id: &InsightId) -> Result<Option<AIInsight>, StoreError> {
        self.find_one(FindColumn::InsightId, id.as_str()).map_err(StoreError::from)
    }

    fn find_by_content_hash(&self, hash: &ContentHash) -> Result<Option<AIInsight>, StoreError> {
        self.find_one(FindColumn::ContentHash, &hash.to_hex()).map_err(StoreError::from)
    }

    fn capacity(&self) -> usize {
        self.config.capacity
    }
}

// ============================================================================//
// SECTION: Row Decoding
// ============================================================================//

/// Reads the raw columns of one insight row.
fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        insight_id: row.get(0)?,
        payload: row.get(1)?,
        hash: row.get(2)?,
        algorithm: row.get(3)?,
    })
}

/// Verifies a row digest and decodes its payload.
fn decode_row(row: StoredRow) -> Result<AIInsight, SqliteStoreError> {
    if row.payload.len() > MAX_INSIGHT_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_INSIGHT_BYTES,
            actual_bytes: row.payload.len(),
        });
    }
    let algorithm = parse_hash_algorithm(&row.algorithm)?;
    let expected = hash_bytes(algorithm, &row.payload);
    if expected.value != row.hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for insight {}", row.insight_id)));
    }
    let insight: AIInsight =
        serde_json::from_slice(&row.payload).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if insight.id.as_str() != row.insight_id {
        return Err(SqliteStoreError::Invalid("insight_id mismatch between key and payload".to_string()));
    }
    Ok(insight)
}

// ============================================================================//
// SECTION: Helpers
// ============================================================================//

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS insights (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    insight_id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    insight_json BLOB NOT NULL,
                    row_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_insights_insight_id ON insights (insight_id);
                CREATE INDEX IF NOT EXISTS idx_insights_content_hash ON insights (content_hash);
                CREATE INDEX IF NOT EXISTS idx_insights_category ON insights (category, seq);",
            )
            .map_err(db)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db)?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    HashAlgorithm::from_label(label)
        .map_err(|_| SqliteStoreError::Invalid(format!("unsupported hash algorithm: {label}")))
}
