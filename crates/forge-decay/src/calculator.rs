//! Production rate calculator implementing the [`RateCalculator`] trait.
//!
//! The calculator is stateless: every evaluation rebuilds the piecewise
//! schedule from the gene's event history, so replaying a period against the
//! same registry snapshot always reproduces the same rates. Nothing is
//! cached as mutable state.

use forge_core::error::RateError;
use forge_core::traits::RateCalculator;
use forge_core::types::RateView;

use crate::schedule::RateSchedule;

/// The production royalty-rate calculator.
///
/// Implements [`RateCalculator`] with:
/// - Linear time decay across the royalty window
/// - Compounding replacement halving at supersession events
/// - Integer-only arithmetic (parts-per-billion, u128 intermediates)
#[derive(Debug, Clone, Default)]
pub struct RoyaltyRate;

impl RoyaltyRate {
    /// Create a new RoyaltyRate calculator.
    pub fn new() -> Self {
        Self
    }
}

impl RateCalculator for RoyaltyRate {
    fn rate_ppb(&self, view: &RateView, at: u64) -> Result<u64, RateError> {
        Ok(RateSchedule::build(view)?.rate_at(at))
    }
}
