// crates/chainpulse-cli/src/state.rs
// ============================================================================
// Module: Ledger State File
// Description: JSON-backed durability for the local prediction ledger.
// Purpose: Serialize ledger writes across processes and persist them atomically.
// Dependencies: chainpulse-core, fd-lock, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`LedgerStateFile`] stores a [`PredictionLedger`] as JSON. Every write holds
//! an exclusive advisory lock on a sibling `<state>.lock` file while it reloads
//! the state, applies the change, and persists the result, so overlapping
//! processes never overwrite each other's records. Persisted bytes go to a
//! unique temporary file in the destination directory, are synced, and then
//! renamed over the previous state so a crash leaves either the old or the new
//! ledger on disk, never a torn file. Reads rely on that rename and take no
//! lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use chainpulse_core::runtime::LedgerCommitError;
use chainpulse_core::runtime::LedgerStateSink;
use chainpulse_core::runtime::LedgerWrite;
use chainpulse_core::runtime::PredictionLedger;
use fd_lock::RwLock;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum ledger state file size in bytes.
pub const MAX_LEDGER_STATE_BYTES: usize = 64 * 1024 * 1024;
/// Attempts to allocate a unique temporary file.
const TEMP_ATTEMPTS: usize = 16;
/// Per-process temporary file counter.
static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ledger state file errors.
#[derive(Debug, Error)]
pub enum LedgerStateError {
    /// No state file exists yet.
    #[error("ledger state not found at {0}; run `chainpulse ledger init`")]
    Missing(PathBuf),
    /// A state file already exists.
    #[error("ledger state already exists at {0}")]
    Exists(PathBuf),
    /// Filesystem failure.
    #[error("ledger state io error: {0}")]
    Io(String),
    /// State file exceeds the size limit.
    #[error("ledger state exceeds size limit ({size} > {limit} bytes)")]
    TooLarge {
        /// Observed size.
        size: u64,
        /// Configured limit.
        limit: usize,
    },
    /// State file could not be decoded.
    #[error("ledger state corrupt: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: State File
// ============================================================================

/// JSON file holding the local ledger state.
#[derive(Debug, Clone)]
pub struct LedgerStateFile {
    /// Destination path.
    path: PathBuf,
}

impl LedgerStateFile {
    /// Creates a handle for `path`; nothing is read or written yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerStateError::Missing`] when no state file exists, or
    /// another [`LedgerStateError`] when the file cannot be read or decoded.
    pub fn load(&self) -> Result<PredictionLedger, LedgerStateError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LedgerStateError::Missing(self.path.clone()));
            }
            Err(err) => return Err(LedgerStateError::Io(err.to_string())),
        };
        let size = file.metadata().map_err(|err| LedgerStateError::Io(err.to_string()))?.len();
        let limit = u64::try_from(MAX_LEDGER_STATE_BYTES).unwrap_or(u64::MAX);
        if size > limit {
            return Err(LedgerStateError::TooLarge {
                size,
                limit: MAX_LEDGER_STATE_BYTES,
            });
        }
        let mut bytes = Vec::new();
        file.take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| LedgerStateError::Io(err.to_string()))?;
        if bytes.len() > MAX_LEDGER_STATE_BYTES {
            return Err(LedgerStateError::TooLarge {
                size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                limit: MAX_LEDGER_STATE_BYTES,
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| LedgerStateError::Corrupt(err.to_string()))
    }

    /// Returns the path of the sibling lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Writes a freshly deployed ledger; refuses to overwrite existing state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerStateError::Exists`] when a state file is present.
    pub fn create(&self, ledger: &PredictionLedger) -> Result<(), LedgerStateError> {
        let mut lock = self.open_lock()?;
        let _guard = lock.write().map_err(|err| LedgerStateError::Io(err.to_string()))?;
        if self.path.exists() {
            return Err(LedgerStateError::Exists(self.path.clone()));
        }
        self.save(ledger)
    }

    /// Applies `apply` to the current state under the exclusive lock and
    /// persists the result before releasing it.
    ///
    /// # Errors
    ///
    /// Returns the error from `apply` unchanged (nothing is written), or a
    /// converted [`LedgerStateError`] when the state cannot be locked, read,
    /// or persisted.
    pub fn update<E>(
        &self,
        apply: impl FnOnce(&mut PredictionLedger) -> Result<(), E>,
    ) -> Result<PredictionLedger, E>
    where
        E: From<LedgerStateError>,
    {
        let mut lock = self.open_lock()?;
        let _guard = lock.write().map_err(|err| LedgerStateError::Io(err.to_string()))?;
        let mut ledger = self.load()?;
        apply(&mut ledger)?;
        self.save(&ledger)?;
        Ok(ledger)
    }

    /// Opens (creating if needed) the sibling lock file.
    fn open_lock(&self) -> Result<RwLock<File>, LedgerStateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| LedgerStateError::Io(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|err| LedgerStateError::Io(err.to_string()))?;
        Ok(RwLock::new(file))
    }

    /// Atomically replaces the state file. Callers hold the lock.
    fn save(&self, ledger: &PredictionLedger) -> Result<(), LedgerStateError> {
        let mut bytes =
            serde_json::to_vec_pretty(ledger).map_err(|err| LedgerStateError::Corrupt(err.to_string()))?;
        bytes.push(b'\n');
        let (temp_path, mut file) = create_temp_file(&self.path)?;
        if let Err(err) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&temp_path);
            return Err(LedgerStateError::Io(err.to_string()));
        }
        drop(file);
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(LedgerStateError::Io(err.to_string()));
        }
        Ok(())
    }
}

/// Carries the ledger rejection through [`LedgerStateFile::update`].
enum SinkFailure {
    /// The write itself was rejected.
    Rejected(LedgerCommitError),
    /// The state file failed.
    State(LedgerStateError),
}

impl From<LedgerStateError> for SinkFailure {
    fn from(error: LedgerStateError) -> Self {
        Self::State(error)
    }
}

impl LedgerStateSink for LedgerStateFile {
    fn commit(&self, write: LedgerWrite<'_>) -> Result<PredictionLedger, LedgerCommitError> {
        self.update(|ledger| write(ledger).map_err(|err| SinkFailure::Rejected(LedgerCommitError::Rejected(err))))
            .map_err(|failure| match failure {
                SinkFailure::Rejected(err) => err,
                SinkFailure::State(err) => LedgerCommitError::Storage(err.to_string()),
            })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates a unique temporary file alongside `path`.
fn create_temp_file(path: &Path) -> Result<(PathBuf, File), LedgerStateError> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LedgerStateError::Io("state path does not include a file name".to_string()))?;
    for _ in 0 .. TEMP_ATTEMPTS {
        let attempt = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = parent.join(format!(".{file_name}.tmp.{}.{attempt}", std::process::id()));
        match OpenOptions::new().write(true).create_new(true).open(&temp_path) {
            Ok(file) => return Ok((temp_path, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(LedgerStateError::Io(err.to_string())),
        }
    }
    Err(LedgerStateError::Io("failed to allocate temporary state path".to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwrap/expect for clarity."
    )]

    use chainpulse_core::Address;
    use chainpulse_core::ContentHash;
    use chainpulse_core::PredictionInput;
    use chainpulse_core::Timestamp;
    use tempfile::TempDir;

    use super::*;

    const OWNER: Address = Address::from_bytes([1; 20]);
    const AGENT: Address = Address::from_bytes([2; 20]);

    fn input(seed: u8) -> PredictionInput {
        PredictionInput {
            content_hash: ContentHash::of(&[seed]),
            category: 1,
            sentiment_score: -5,
            summary: format!("summary {seed}"),
        }
    }

    #[test]
    fn update_then_load_preserves_ledger() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("nested").join("ledger.json"));
        state.create(&PredictionLedger::deploy(OWNER, AGENT).unwrap()).unwrap();
        let ledger = state
            .update(|ledger| {
                ledger
                    .store_prediction(&AGENT, Timestamp::from_unix_secs(1_700_000_000), &input(1))
                    .map(|_| ())
                    .map_err(|err| LedgerStateError::Corrupt(err.to_string()))
            })
            .unwrap();
        assert_eq!(ledger.prediction_count(), 1);
        assert_eq!(state.load().unwrap(), ledger);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("ledger.json"));
        assert!(matches!(state.load(), Err(LedgerStateError::Missing(_))));
        let result = state.update(|_| Ok::<(), LedgerStateError>(()));
        assert!(matches!(result, Err(LedgerStateError::Missing(_))));
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("ledger.json"));
        let ledger = PredictionLedger::deploy(OWNER, AGENT).unwrap();
        state.create(&ledger).unwrap();
        assert!(matches!(state.create(&ledger), Err(LedgerStateError::Exists(_))));
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(LedgerStateFile::new(path).load(), Err(LedgerStateError::Corrupt(_))));
    }

    #[test]
    fn writes_leave_only_state_and_lock_files() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("ledger.json"));
        state.create(&PredictionLedger::deploy(OWNER, AGENT).unwrap()).unwrap();
        state.update(|_| Ok::<(), LedgerStateError>(())).unwrap();
        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["ledger.json".to_string(), "ledger.json.lock".to_string()]);
    }

    #[test]
    fn rejected_update_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("ledger.json"));
        let ledger = PredictionLedger::deploy(OWNER, AGENT).unwrap();
        state.create(&ledger).unwrap();
        let stranger = Address::from_bytes([9; 20]);
        let result = state.commit(Box::new(|ledger: &mut PredictionLedger| {
            ledger.store_prediction(&stranger, Timestamp::from_unix_secs(1), &input(1)).map(|_| ())
        }));
        assert!(matches!(result, Err(LedgerCommitError::Rejected(_))));
        assert_eq!(state.load().unwrap(), ledger);
    }

    #[test]
    fn sink_commits_against_the_file_not_the_caller_copy() {
        let dir = TempDir::new().unwrap();
        let state = LedgerStateFile::new(dir.path().join("ledger.json"));
        state.create(&PredictionLedger::deploy(OWNER, AGENT).unwrap()).unwrap();
        for seed in 0 .. 2 {
            let committed = state
                .commit(Box::new(move |ledger: &mut PredictionLedger| {
                    ledger.store_prediction(&AGENT, Timestamp::from_unix_secs(1), &input(seed)).map(|_| ())
                }))
                .unwrap();
            assert_eq!(committed.prediction_count(), u64::from(seed) + 1);
        }
        assert_eq!(state.load().unwrap().prediction_count(), 2);
    }
}
