// crates/chainpulse-core/src/runtime/verifier.rs
// ============================================================================
// Module: ChainPulse Insight Verifier
// Description: Re-derives canonical content and checks it against the ledger.
// Purpose: Answer whether stored content still matches its committed hash.
// Dependencies: serde, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Verification is read-only and freely retryable. The result is tri-state:
//! [`VerificationOutcome::Mismatch`] is the only negative proof; anything that
//! prevents an answer (no id yet, ledger down or slow, unknown id) is
//! [`VerificationOutcome::Unavailable`] and must not be shown as tampering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::core::AIInsight;
use crate::core::PredictionId;
use crate::core::canonical_string;
use crate::interfaces::LedgerClient;
use crate::interfaces::LedgerClientError;
use crate::runtime::audit::PipelineAuditSink;
use crate::runtime::audit::VerificationAuditEvent;
use crate::runtime::retry::LedgerCallError;
use crate::runtime::retry::LedgerCallPolicy;
use crate::runtime::retry::bounded_read;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Why a verification could not produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The insight has no prediction id yet.
    NoPredictionId,
    /// The ledger has no record at the id.
    PredictionNotFound,
    /// The ledger could not be reached.
    LedgerUnreachable,
    /// The ledger did not answer in time.
    LedgerTimeout,
    /// The ledger refused the read.
    LedgerRejected,
    /// The stored insight could not be re-encoded.
    Canonicalization,
}

impl UnavailableReason {
    /// Returns the stable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoPredictionId => "no_prediction_id",
            Self::PredictionNotFound => "prediction_not_found",
            Self::LedgerUnreachable => "ledger_unreachable",
            Self::LedgerTimeout => "ledger_timeout",
            Self::LedgerRejected => "ledger_rejected",
            Self::Canonicalization => "canonicalization",
        }
    }
}

/// Tri-state verification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Content hashes to the committed value.
    Verified,
    /// Content does not hash to the committed value.
    Mismatch,
    /// No answer could be produced.
    Unavailable(UnavailableReason),
}

impl VerificationOutcome {
    /// Returns the status label (`verified`, `mismatch`, `unavailable`).
    #[must_use]
    pub const fn status(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Mismatch => "mismatch",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Returns true only for [`VerificationOutcome::Verified`].
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Returns the unavailability reason, if any.
    #[must_use]
    pub const fn reason(self) -> Option<UnavailableReason> {
        match self {
            Self::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Maps a failed ledger read to an unavailability reason.
const fn unavailable(err: &LedgerCallError) -> UnavailableReason {
    match err {
        LedgerCallError::Timeout(_) => UnavailableReason::LedgerTimeout,
        LedgerCallError::Client(LedgerClientError::Unreachable(_)) => UnavailableReason::LedgerUnreachable,
        LedgerCallError::Client(LedgerClientError::NotFound(_)) => UnavailableReason::PredictionNotFound,
        LedgerCallError::Client(LedgerClientError::Rejected(_)) => UnavailableReason::LedgerRejected,
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Insight verifier.
pub struct InsightVerifier<L> {
    /// Ledger client.
    ledger: L,
    /// Read deadline and retries.
    policy: LedgerCallPolicy,
    /// Audit sink.
    audit: Arc<dyn PipelineAuditSink>,
}

impl<L: LedgerClient> InsightVerifier<L> {
    /// Creates a verifier.
    #[must_use]
    pub fn new(ledger: L, policy: LedgerCallPolicy, audit: Arc<dyn PipelineAuditSink>) -> Self {
        Self {
            ledger,
            policy,
            audit,
        }
    }

    /// Verifies a stored insight by re-encoding it with its recorded canonical version.
    pub async fn verify_insight(&self, insight: &AIInsight) -> VerificationOutcome {
        let outcome = match insight.prediction_id {
            None => VerificationOutcome::Unavailable(UnavailableReason::NoPredictionId),
            Some(id) => match canonical_string(&insight.draft, insight.canonical_version) {
                Ok(content) => self.check(id, &content).await,
                Err(_) => VerificationOutcome::Unavailable(UnavailableReason::Canonicalization),
            },
        };
        self.record(Some(insight), insight.prediction_id, outcome);
        outcome
    }

    /// Verifies caller-supplied content against the record at `id`.
    pub async fn verify_content(&self, id: PredictionId, content: &str) -> VerificationOutcome {
        let outcome = self.check(id, content).await;
        self.record(None, Some(id), outcome);
        outcome
    }

    /// Calls the ledger's read-only verification.
    async fn check(&self, id: PredictionId, content: &str) -> VerificationOutcome {
        match bounded_read(&self.policy, || self.ledger.verify_prediction(id, content)).await {
            Ok(true) => VerificationOutcome::Verified,
            Ok(false) => VerificationOutcome::Mismatch,
            Err(err) => VerificationOutcome::Unavailable(unavailable(&err)),
        }
    }

    /// Emits a verification audit event.
    fn record(&self, insight: Option<&AIInsight>, id: Option<PredictionId>, outcome: VerificationOutcome) {
        self.audit.record_verification(&VerificationAuditEvent::new(
            insight.map(|insight| insight.id.clone()),
            id,
            outcome.status(),
            outcome.reason().map(UnavailableReason::label),
        ));
    }
}
