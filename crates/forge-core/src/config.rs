//! Engine configuration.
//!
//! Provides [`EngineConfig`] with defaults matching the tier schedule and
//! payout rules. Deployments tune these programmatically; the constants in
//! [`constants`](crate::constants) are the canonical defaults.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BURN_BPS, CONFIRM_WINDOW_SECS, LINEAGE_CREDIT_BPS, LINEAGE_MAX_DEPTH, MIN_PAYOUT,
    USAGE_SUSPEND_SECS,
};

/// Tunable engine parameters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Flat burn on gross disbursements, in basis points.
    pub burn_bps: u64,
    /// Minimum net amount (embers) that triggers a disbursement.
    pub min_payout: u64,
    /// Lineage credit per eligible ancestor, in basis points of the earning
    /// gene's gross attributable revenue.
    pub lineage_credit_bps: u64,
    /// Maximum derivation distance that still earns lineage credit.
    pub lineage_max_depth: u32,
    /// Inactivity window (seconds) after which a gene is suspended.
    pub usage_suspend_secs: u64,
    /// Treasury confirmation window (seconds) after period close.
    pub confirm_window_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            burn_bps: BURN_BPS,
            min_payout: MIN_PAYOUT,
            lineage_credit_bps: LINEAGE_CREDIT_BPS,
            lineage_max_depth: LINEAGE_MAX_DEPTH,
            usage_suspend_secs: USAGE_SUSPEND_SECS,
            confirm_window_secs: CONFIRM_WINDOW_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOKEN;

    #[test]
    fn default_burn_is_5_percent() {
        assert_eq!(EngineConfig::default().burn_bps, 500);
    }

    #[test]
    fn default_min_payout_is_100_tokens() {
        assert_eq!(EngineConfig::default().min_payout, 100 * TOKEN);
    }

    #[test]
    fn default_lineage_depth_is_two() {
        assert_eq!(EngineConfig::default().lineage_max_depth, 2);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let cfg = EngineConfig { burn_bps: 250, ..EngineConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
