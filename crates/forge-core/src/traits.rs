//! Trait interfaces for the Forge engine.
//!
//! These traits define the contracts between crates:
//! - [`RateCalculator`] — pure royalty-rate math (forge-decay implements)
//! - [`Authorizer`] — external confirmation capability for high tiers
//! - [`TreasuryHandoff`] — fire-and-forget disbursement submission
//!
//! The engine holds no policy about who may authorize what, and never waits
//! synchronously on treasury confirmation; both are narrow external seams.

use crate::error::{PayoutError, RateError};
use crate::types::{ArtifactId, DisbursementRecord, RateView, RequestId, Tier};

/// Pure computation of a gene's royalty rate at a point in time.
///
/// All math uses integer arithmetic with parts-per-billion precision.
/// The rate depends only on the gene's rate window and its supersession
/// history — never on status, because suspension and disputes freeze
/// eligibility, not the decay clock.
pub trait RateCalculator: Send + Sync {
    /// Royalty rate at `at`, in parts-per-billion of attributable revenue.
    ///
    /// Returns 0 outside the gene's royalty window.
    fn rate_ppb(&self, view: &RateView, at: u64) -> Result<u64, RateError>;

    /// Royalty amount (in embers) on `attributable` revenue at `at`.
    ///
    /// Default implementation: `attributable * rate_ppb / PPB_PRECISION`,
    /// floored, with a u128 intermediate.
    fn royalty(&self, attributable: u64, view: &RateView, at: u64) -> Result<u64, RateError> {
        let rate = self.rate_ppb(view, at)?;
        let amount = (attributable as u128)
            .checked_mul(rate as u128)
            .ok_or(RateError::ArithmeticOverflow)?
            / crate::constants::PPB_PRECISION as u128;
        Ok(amount as u64)
    }
}

/// External decision authority for tier assignments that need confirmation
/// (FurnaceForged and Invariant).
pub trait Authorizer: Send + Sync {
    /// Whether the assignment of `target` to the artifact is confirmed.
    fn authorize(&self, artifact: &ArtifactId, target: Tier) -> bool;
}

/// Handoff to the external treasury/ledger.
///
/// `submit` must not block on settlement: it queues the request and returns
/// a request id. Confirmation or rejection arrives later through the payout
/// scheduler's `confirm`/`reject` methods.
pub trait TreasuryHandoff: Send + Sync {
    /// Push a disbursement request. Returns the treasury-side request id.
    ///
    /// # Errors
    /// `PayoutError::SubmitFailed` if the request could not even be queued
    /// (the amount stays in the contributor's pending balance).
    fn submit(&self, record: &DisbursementRecord) -> Result<RequestId, PayoutError>;
}
