// crates/chainpulse-core/src/runtime/ledger.rs
// ============================================================================
// Module: ChainPulse Prediction Ledger
// Description: Append-only, access-controlled prediction ledger state machine.
// Purpose: Provide the authoritative record of committed content hashes.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! [`PredictionLedger`] mirrors the on-chain oracle contract as a pure state
//! machine. Every write names its caller and the host-supplied commit time;
//! the ledger never reads the wall clock. Writes are all-or-nothing: a rejected
//! call leaves records, owner, agent, nonce, and event log untouched.
//!
//! Security posture: callers are untrusted; authorization and bounds are
//! checked on every write before any state changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Address;
use crate::core::Category;
use crate::core::ContentHash;
use crate::core::Prediction;
use crate::core::PredictionBatch;
use crate::core::PredictionId;
use crate::core::PredictionInput;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum summary length in bytes, enforced at insertion.
pub const MAX_LEDGER_SUMMARY_BYTES: usize = 200;
/// Inclusive sentiment bounds enforced at insertion.
pub const LEDGER_SENTIMENT_RANGE: (i8, i8) = (-100, 100);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ledger rejections. Display strings are stable revert reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Caller is neither owner nor agent.
    #[error("Not authorized")]
    Unauthorized,
    /// Caller is not the owner (or ownership was renounced).
    #[error("Caller is not the owner")]
    NotOwner,
    /// Sentiment outside -100..=100.
    #[error("Score out of range")]
    SentimentOutOfRange,
    /// Summary longer than 200 bytes.
    #[error("Summary too long")]
    SummaryTooLong,
    /// Batch arrays have different lengths.
    #[error("Array length mismatch")]
    ArrayLengthMismatch,
    /// Category code above 3.
    #[error("Invalid category")]
    InvalidCategory,
    /// Index is out of range.
    #[error("Prediction does not exist")]
    NotFound,
    /// Zero address offered as owner.
    #[error("Invalid owner")]
    InvalidOwner,
    /// Zero address offered as agent.
    #[error("Invalid agent")]
    InvalidAgent,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Ledger event log entry, appended in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum LedgerEvent {
    /// A prediction was appended.
    #[serde(rename_all = "camelCase")]
    PredictionStored {
        /// Assigned index.
        id: PredictionId,
        /// Committed content hash.
        content_hash: ContentHash,
        /// Category code.
        category: u8,
        /// Sentiment score.
        sentiment_score: i8,
        /// Commit time.
        timestamp: Timestamp,
        /// Summary text.
        summary: String,
    },
    /// The agent identity was rotated.
    #[serde(rename_all = "camelCase")]
    AgentAddressUpdated {
        /// Previous agent.
        old_agent: Address,
        /// New agent.
        new_agent: Address,
    },
    /// Ownership changed (including deployment and renouncement).
    #[serde(rename_all = "camelCase")]
    OwnershipTransferred {
        /// Previous owner, if any.
        previous_owner: Option<Address>,
        /// New owner, if any.
        new_owner: Option<Address>,
    },
}

// ============================================================================
// SECTION: Ledger State
// ============================================================================

/// Prediction ledger state.
///
/// # Invariants
/// - `predictions[i]` has id `i`; records are never modified or removed.
/// - `nonce` counts successful state-changing calls.
/// - Owner is `None` only after renouncement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionLedger {
    /// Current owner.
    owner: Option<Address>,
    /// Designated writer identity.
    agent: Address,
    /// Records in insertion order.
    predictions: Vec<Prediction>,
    /// Successful write counter.
    nonce: u64,
    /// Event log.
    events: Vec<LedgerEvent>,
}

impl PredictionLedger {
    /// Deploys a ledger owned by `owner` with `agent` as the designated writer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidOwner`] or [`LedgerError::InvalidAgent`]
    /// for zero addresses.
    pub fn deploy(owner: Address, agent: Address) -> Result<Self, LedgerError> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        if agent.is_zero() {
            return Err(LedgerError::InvalidAgent);
        }
        Ok(Self {
            owner: Some(owner),
            agent,
            predictions: Vec::new(),
            nonce: 0,
            events: vec![LedgerEvent::OwnershipTransferred {
                previous_owner: None,
                new_owner: Some(owner),
            }],
        })
    }

    /// Returns the current owner, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<Address> {
        self.owner
    }

    /// Returns the designated agent.
    #[must_use]
    pub const fn agent_address(&self) -> Address {
        self.agent
    }

    /// Returns the number of committed predictions.
    #[must_use]
    pub fn prediction_count(&self) -> u64 {
        self.predictions.len() as u64
    }

    /// Returns the successful write counter.
    #[must_use]
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Returns the event log in commit order.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Appends one prediction and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the caller is not a writer or a bound is violated.
    pub fn store_prediction(
        &mut self,
        caller: &Address,
        now: Timestamp,
        input: &PredictionInput,
    ) -> Result<PredictionId, LedgerError> {
        self.require_writer(caller)?;
        let category = validate_element(input.category, input.sentiment_score, &input.summary)?;
        let id = self.append(input.content_hash, category, input.sentiment_score, &input.summary, now);
        self.nonce += 1;
        Ok(id)
    }

    /// Appends a whole batch atomically and returns the number appended.
    ///
    /// Every element is validated before the first append. An empty batch is
    /// accepted and changes nothing except the nonce.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the caller is not a writer, the arrays are
    /// misaligned, or any element violates a bound; no element is appended.
    pub fn store_prediction_batch(
        &mut self,
        caller: &Address,
        now: Timestamp,
        batch: &PredictionBatch,
    ) -> Result<u64, LedgerError> {
        self.require_writer(caller)?;
        if !batch.is_aligned() {
            return Err(LedgerError::ArrayLengthMismatch);
        }
        let mut categories = Vec::with_capacity(batch.len());
        for index in 0 .. batch.len() {
            categories.push(validate_element(
                batch.categories[index],
                batch.sentiments[index],
                &batch.summaries[index],
            )?);
        }
        for (index, category) in categories.into_iter().enumerate() {
            self.append(
                batch.hashes[index],
                category,
                batch.sentiments[index],
                &batch.summaries[index],
                now,
            );
        }
        self.nonce += 1;
        Ok(batch.len() as u64)
    }

    /// Rotates the designated agent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidAgent`].
    pub fn set_agent_address(&mut self, caller: &Address, new_agent: Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        if new_agent.is_zero() {
            return Err(LedgerError::InvalidAgent);
        }
        let old_agent = self.agent;
        self.agent = new_agent;
        self.nonce += 1;
        self.events.push(LedgerEvent::AgentAddressUpdated {
            old_agent,
            new_agent,
        });
        Ok(())
    }

    /// Transfers ownership.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidOwner`].
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        self.set_owner(Some(new_owner));
        Ok(())
    }

    /// Leaves the ledger without an owner. The agent may keep writing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] when the caller is not the owner.
    pub fn renounce_ownership(&mut self, caller: &Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        self.set_owner(None);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns the prediction at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for out-of-range ids.
    pub fn get_prediction(&self, id: PredictionId) -> Result<&Prediction, LedgerError> {
        usize::try_from(id.get())
            .ok()
            .and_then(|index| self.predictions.get(index))
            .ok_or(LedgerError::NotFound)
    }

    /// Returns `min(count, prediction_count)` records, newest first.
    #[must_use]
    pub fn get_latest_predictions(&self, count: u64) -> Vec<Prediction> {
        let take = usize::try_from(count).unwrap_or(usize::MAX);
        self.predictions.iter().rev().take(take).cloned().collect()
    }

    /// Returns whether keccak-256 of `content` equals the stored hash at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for out-of-range ids.
    pub fn verify_prediction(&self, id: PredictionId, content: &str) -> Result<bool, LedgerError> {
        self.verify_prediction_bytes(id, content.as_bytes())
    }

    /// Byte-level variant of [`PredictionLedger::verify_prediction`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for out-of-range ids.
    pub fn verify_prediction_bytes(&self, id: PredictionId, content: &[u8]) -> Result<bool, LedgerError> {
        let record = self.get_prediction(id)?;
        Ok(record.content_hash == ContentHash::of(content))
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Rejects callers that are neither owner nor agent.
    fn require_writer(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller == self.agent || self.owner.as_ref() == Some(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    /// Rejects callers that are not the current owner.
    fn require_owner(&self, caller: &Address) -> Result<(), LedgerError> {
        if self.owner.as_ref() == Some(caller) { Ok(()) } else { Err(LedgerError::NotOwner) }
    }

    /// Replaces the owner and logs the transfer.
    fn set_owner(&mut self, new_owner: Option<Address>) {
        let previous_owner = self.owner;
        self.owner = new_owner;
        self.nonce += 1;
        self.events.push(LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
    }

    /// Appends a validated record and its event.
    fn append(
        &mut self,
        content_hash: ContentHash,
        category: Category,
        sentiment_score: i8,
        summary: &str,
        now: Timestamp,
    ) -> PredictionId {
        let id = PredictionId::new(self.prediction_count());
        self.predictions.push(Prediction {
            content_hash,
            timestamp: now,
            category,
            sentiment_score,
            summary: summary.to_string(),
        });
        self.events.push(LedgerEvent::PredictionStored {
            id,
            content_hash,
            category: category.code(),
            sentiment_score,
            timestamp: now,
            summary: summary.to_string(),
        });
        id
    }
}

/// Validates one record's bounds in revert order.
fn validate_element(category: u8, sentiment: i8, summary: &str) -> Result<Category, LedgerError> {
    if sentiment < LEDGER_SENTIMENT_RANGE.0 || sentiment > LEDGER_SENTIMENT_RANGE.1 {
        return Err(LedgerError::SentimentOutOfRange);
    }
    if summary.len() > MAX_LEDGER_SUMMARY_BYTES {
        return Err(LedgerError::SummaryTooLong);
    }
    Category::from_code(category).map_err(|_| LedgerError::InvalidCategory)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
