// crates/chainpulse-core/src/runtime/local_ledger.rs
// ============================================================================
// Module: ChainPulse Local Ledger Client
// Description: In-process ledger client over the prediction ledger state machine.
// Purpose: Run the pipeline against a local deployment with one signer identity.
// Dependencies: async-trait, crate::{core, interfaces, runtime::ledger}
// ============================================================================

//! ## Overview
//! [`LocalLedgerClient`] wraps a shared [`PredictionLedger`] behind a mutex so
//! writes are serialized within a process. Without a sink each write is
//! applied to a copy of the state and then swapped in. With a
//! [`LedgerStateSink`] the sink owns the write: it reloads the durable state
//! under an exclusive lock, applies the write, persists the result, and hands
//! the committed state back, so writers in other processes are serialized too.
//! A sink failure leaves the ledger unchanged and surfaces as
//! [`LedgerClientError::Unreachable`].
//!
//! Transaction references are keccak-256 over the signer address, the ledger
//! nonce before the write, and the committed content hashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::Address;
use crate::core::CommitReceipt;
use crate::core::ContentHash;
use crate::core::Prediction;
use crate::core::PredictionBatch;
use crate::core::PredictionId;
use crate::core::PredictionInput;
use crate::core::Timestamp;
use crate::core::TxHash;
use crate::core::hashing::keccak256;
use crate::interfaces::Clock;
use crate::interfaces::LedgerClient;
use crate::interfaces::LedgerClientError;
use crate::runtime::ledger::LedgerError;
use crate::runtime::ledger::PredictionLedger;

// ============================================================================
// SECTION: State Sink
// ============================================================================

/// Write applied to the freshest durable ledger state.
pub type LedgerWrite<'a> = Box<dyn FnOnce(&mut PredictionLedger) -> Result<(), LedgerError> + 'a>;

/// Failure of a durable ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCommitError {
    /// The ledger rejected the write; nothing was persisted.
    Rejected(LedgerError),
    /// The durable state could not be locked, read, or written.
    Storage(String),
}

/// Durable, exclusively locked home of the ledger state.
pub trait LedgerStateSink: Send + Sync {
    /// Reloads the durable state under an exclusive lock, applies `write`,
    /// persists the result, and returns the committed state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerCommitError::Rejected`] when `write` fails and
    /// [`LedgerCommitError::Storage`] when the state cannot be locked, read,
    /// or persisted. The durable state is unchanged in both cases.
    fn commit(&self, write: LedgerWrite<'_>) -> Result<PredictionLedger, LedgerCommitError>;
}

// ============================================================================
// SECTION: Local Client
// ============================================================================

/// In-process ledger client bound to one signer.
#[derive(Clone)]
pub struct LocalLedgerClient {
    /// Shared ledger state.
    ledger: Arc<Mutex<PredictionLedger>>,
    /// Identity that signs every write.
    signer: Address,
    /// Commit time source.
    clock: Arc<dyn Clock>,
    /// Optional durability hook.
    sink: Option<Arc<dyn LedgerStateSink>>,
}

impl LocalLedgerClient {
    /// Creates a client over `ledger` signing as `signer`.
    #[must_use]
    pub fn new(ledger: PredictionLedger, signer: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            signer,
            clock,
            sink: None,
        }
    }

    /// Creates a client sharing `ledger` with other clients (for example a second signer).
    #[must_use]
    pub fn shared(ledger: Arc<Mutex<PredictionLedger>>, signer: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            signer,
            clock,
            sink: None,
        }
    }

    /// Attaches a durability hook.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LedgerStateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the shared ledger handle.
    #[must_use]
    pub fn ledger_handle(&self) -> Arc<Mutex<PredictionLedger>> {
        Arc::clone(&self.ledger)
    }

    /// Returns the signer identity.
    #[must_use]
    pub const fn signer(&self) -> Address {
        self.signer
    }

    /// Returns a copy of the current ledger state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClientError::Unreachable`] when the state lock is poisoned.
    pub fn snapshot(&self) -> Result<PredictionLedger, LedgerClientError> {
        self.read(|ledger| Ok(ledger.clone()))
    }

    /// Runs a read against the locked ledger.
    fn read<T>(
        &self,
        f: impl FnOnce(&PredictionLedger) -> Result<T, LedgerClientError>,
    ) -> Result<T, LedgerClientError> {
        let guard = self
            .ledger
            .lock()
            .map_err(|_| LedgerClientError::Unreachable("ledger state lock poisoned".to_string()))?;
        f(&guard)
    }

    /// Applies a write through the sink (or to a private copy), then publishes
    /// the committed state.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut PredictionLedger, Timestamp) -> Result<T, LedgerError>,
    ) -> Result<(T, u64, Timestamp), LedgerClientError> {
        let mut guard = self
            .ledger
            .lock()
            .map_err(|_| LedgerClientError::Unreachable("ledger state lock poisoned".to_string()))?;
        let now = Timestamp::from_unix_millis(self.clock.now_millis());
        let mut nonce = 0;
        let mut value = None;
        let apply = |ledger: &mut PredictionLedger| -> Result<(), LedgerError> {
            nonce = ledger.nonce();
            value = Some(f(ledger, now)?);
            Ok(())
        };
        let committed = match &self.sink {
            Some(sink) => sink.commit(Box::new(apply)).map_err(|err| match err {
                LedgerCommitError::Rejected(err) => LedgerClientError::Rejected(err.to_string()),
                LedgerCommitError::Storage(message) => LedgerClientError::Unreachable(message),
            })?,
            None => {
                let mut next = guard.clone();
                apply(&mut next).map_err(|err| LedgerClientError::Rejected(err.to_string()))?;
                next
            }
        };
        *guard = committed;
        drop(guard);
        let value = value
            .ok_or_else(|| LedgerClientError::Unreachable("ledger write was not applied".to_string()))?;
        Ok((value, nonce, now))
    }

    /// Derives the transaction reference for a write.
    fn tx_hash(&self, nonce: u64, hashes: &[ContentHash]) -> TxHash {
        let mut preimage = Vec::with_capacity(20 + 8 + hashes.len() * 32);
        preimage.extend_from_slice(self.signer.as_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        for hash in hashes {
            preimage.extend_from_slice(hash.as_bytes());
        }
        TxHash::from_bytes(keccak256(&preimage))
    }
}

/// Maps a ledger read rejection onto the client taxonomy.
fn read_error(id: PredictionId, err: LedgerError) -> LedgerClientError {
    match err {
        LedgerError::NotFound => LedgerClientError::NotFound(id.get()),
        other => LedgerClientError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl LedgerClient for LocalLedgerClient {
    async fn store_prediction(
        &self,
        input: PredictionInput,
    ) -> Result<(PredictionId, CommitReceipt), LedgerClientError> {
        let signer = self.signer;
        let (id, nonce, now) = self.write(|ledger, now| ledger.store_prediction(&signer, now, &input))?;
        let receipt = CommitReceipt {
            tx_hash: self.tx_hash(nonce, &[input.content_hash]),
            batch_size: 1,
            committed_at: now,
        };
        Ok((id, receipt))
    }

    async fn store_prediction_batch(
        &self,
        batch: &PredictionBatch,
    ) -> Result<CommitReceipt, LedgerClientError> {
        let signer = self.signer;
        let (appended, nonce, now) =
            self.write(|ledger, now| ledger.store_prediction_batch(&signer, now, batch))?;
        Ok(CommitReceipt {
            tx_hash: self.tx_hash(nonce, &batch.hashes),
            batch_size: appended,
            committed_at: now,
        })
    }

    async fn prediction_count(&self) -> Result<u64, LedgerClientError> {
        self.read(|ledger| Ok(ledger.prediction_count()))
    }

    async fn get_prediction(&self, id: PredictionId) -> Result<Prediction, LedgerClientError> {
        self.read(|ledger| ledger.get_prediction(id).cloned().map_err(|err| read_error(id, err)))
    }

    async fn get_latest_predictions(&self, count: u64) -> Result<Vec<Prediction>, LedgerClientError> {
        self.read(|ledger| Ok(ledger.get_latest_predictions(count)))
    }

    async fn verify_prediction(
        &self,
        id: PredictionId,
        content: &str,
    ) -> Result<bool, LedgerClientError> {
        self.read(|ledger| ledger.verify_prediction(id, content).map_err(|err| read_error(id, err)))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
